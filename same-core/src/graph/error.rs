//! Error types for graph construction

use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the graph builder
///
/// Structural errors are returned by the call that caused them; the graph is
/// left exactly as it was before that call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An operation or volume with this name already exists
    #[error("operation '{0}' is already defined in this pipeline")]
    DuplicateOperation(String),

    /// A global parameter with this name already exists
    #[error("parameter '{0}' is already defined in this pipeline")]
    DuplicateParameter(String),

    /// The edge would make the dependency relation cyclic
    #[error(
        "'{dependent}' cannot run after '{prerequisite}': \
         '{prerequisite}' already depends on '{dependent}'"
    )]
    Cycle {
        dependent: String,
        prerequisite: String,
    },

    #[error("operation '{0}' is not defined in this pipeline")]
    UnknownOperation(String),

    #[error("operation '{operation}' has no output named '{output}'")]
    UnknownOutput { operation: String, output: String },

    #[error("pipeline parameter '{0}' is not declared")]
    UnknownParameter(String),

    #[error("volume '{0}' is not declared in this pipeline")]
    UnknownVolume(String),

    #[error("invalid capacity for volume '{volume}': {reason}")]
    InvalidCapacity { volume: String, reason: String },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("operation '{operation}' mounts volume '{volume}' more than once")]
    DuplicateMount { operation: String, volume: String },

    /// The name is generated for a mount or output of the same operation
    #[error(
        "operation '{operation}' cannot use '{name}': \
         the name is reserved for {reserved_for}"
    )]
    ReservedName {
        operation: String,
        name: String,
        reserved_for: String,
    },

    #[error("mount path '{0}' must be absolute")]
    InvalidMountPath(String),

    #[error("failed to serialize workflow: {0}")]
    Serialization(String),
}
