//! Data Transfer Objects
//!
//! Wire shapes exchanged with the cluster API server and the Kubeflow
//! Pipelines API. Domain types convert to and from these at the adapter edge.

pub mod pipeline;
pub mod secret;
