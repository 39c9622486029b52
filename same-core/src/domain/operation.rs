//! Operation types
//!
//! An operation is one container step in a pipeline. Its inputs are either
//! literals, global pipeline parameters, or typed handles to another
//! operation's named outputs. Output handles are the only way data flows
//! between operations; referencing one implies an ordering edge.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::volume::Mount;

/// Reference to a named output of an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub operation: String,
    pub output: String,
}

/// Value bound to an operation input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    /// A fixed value known at build time
    Literal(String),
    /// A global pipeline parameter supplied when the run starts
    Pipeline(String),
    /// The output of another operation
    Output(OutputRef),
}

impl ParamValue {
    pub fn literal(value: impl ToString) -> Self {
        ParamValue::Literal(value.to_string())
    }

    pub fn pipeline(name: impl Into<String>) -> Self {
        ParamValue::Pipeline(name.into())
    }
}

/// Definition of an operation to add to a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub id: String,
    pub image: String,
    pub command: Vec<String>,
    pub params: IndexMap<String, ParamValue>,
    pub outputs: IndexSet<String>,
    pub mounts: Vec<Mount>,
}

impl OperationSpec {
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            command: Vec::new(),
            params: IndexMap::new(),
            outputs: IndexSet::new(),
            mounts: Vec::new(),
        }
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Declare a named output the container writes to `/tmp/outputs/<name>/data`
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.insert(name.into());
        self
    }

    /// Attach a declared volume; may be called once per volume
    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Operations referenced through output handles, in parameter order
    pub fn referenced_operations(&self) -> impl Iterator<Item = &OutputRef> {
        self.params.values().filter_map(|value| match value {
            ParamValue::Output(output) => Some(output),
            _ => None,
        })
    }
}

/// Handle returned once an operation is registered in a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    id: String,
}

impl OperationHandle {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bind a named output of this operation as an input elsewhere
    pub fn output(&self, name: impl Into<String>) -> ParamValue {
        ParamValue::Output(OutputRef {
            operation: self.id.clone(),
            output: name.into(),
        })
    }
}
