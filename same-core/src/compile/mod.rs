//! Graph compilation
//!
//! `PipelineGraph::compile` renders the graph into an Argo workflow (YAML) and
//! wraps it in an [`Artifact`]. Compilation is a pure function of the graph:
//! the same graph yields the same bytes, and the archive written from an
//! artifact carries fixed metadata so it is byte-stable as well.

mod archive;
pub mod workflow;

pub use archive::{ARCHIVE_ENTRY, read_archive};
pub use workflow::Workflow;

use std::path::Path;
use tracing::info;

use crate::graph::{GraphError, PipelineGraph, Result};

/// A compiled pipeline ready for upload
#[derive(Debug, Clone)]
pub struct Artifact {
    name: String,
    workflow: Workflow,
    document: Vec<u8>,
}

impl Artifact {
    /// Pipeline display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// The serialized workflow document
    pub fn as_bytes(&self) -> &[u8] {
        &self.document
    }

    /// Package the document as a `.tar.gz` archive in memory
    pub fn to_archive(&self) -> std::io::Result<Vec<u8>> {
        archive::pack(&self.document)
    }

    /// Write the `.tar.gz` archive to `path`
    pub fn write_archive(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_archive()?)?;
        info!("Wrote pipeline archive to {}", path.display());
        Ok(())
    }
}

impl PipelineGraph {
    /// Serialize the graph into a workflow artifact
    ///
    /// Structural problems are rejected while the graph is built, so the only
    /// failure left here is serialization itself.
    pub fn compile(&self) -> Result<Artifact> {
        let workflow = workflow::render(self);
        let document = serde_yaml::to_string(&workflow)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        Ok(Artifact {
            name: self.name().to_string(),
            workflow,
            document: document.into_bytes(),
        })
    }
}
