//! Core domain types
//!
//! This module contains the structures shared by the graph builder, the
//! notebook compiler, the HTTP adapters and the CLI.

pub mod credential;
pub mod operation;
pub mod program;
pub mod quantity;
pub mod run_record;
pub mod volume;
