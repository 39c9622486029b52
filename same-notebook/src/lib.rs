//! SAME Notebook
//!
//! Turns a data-science notebook into a pipeline graph:
//! - Loading, with `.ipynb` conversion through jupytext
//! - Step, parameter and import extraction
//! - Graph construction from a program file and parsed steps

pub mod builder;
pub mod convert;
pub mod parser;

pub use builder::{BuildOptions, DEFAULT_BASE_IMAGE, build_graph};
pub use convert::load_notebook;
pub use parser::{NotebookError, ParsedNotebook, Step, parse_notebook};
