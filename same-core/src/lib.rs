//! SAME Core
//!
//! Core types and abstractions for the SAME pipeline toolkit.
//!
//! This crate contains:
//! - Domain types: operations, volumes, credentials, program files, run records
//! - Graph: the validating pipeline-graph builder
//! - Compile: workflow rendering and archive packaging
//! - Secret: the secret-store seam and the credential upsert routine
//! - DTOs: wire shapes shared with the HTTP adapters

pub mod compile;
pub mod domain;
pub mod dto;
pub mod graph;
pub mod secret;
