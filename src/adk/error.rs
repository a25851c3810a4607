// SPDX-License-Identifier: MIT

//! Typed error handling for cfit-rs
//!
//! Errors are split by where they can happen:
//! - `GraphError` only at graph-construction time
//! - `TransportError` when talking to an external service
//! - `NodeError` when a task unit fails (always fatal to the run)
//! - `CheckpointError` from the persistence layer
//! - `RunError` surfaced to the caller of a graph invocation
//!
//! Malformed LLM output is not an error anywhere in this hierarchy; it is
//! absorbed by `adk::coerce` inside the node.

use thiserror::Error;

/// Top-level error type for cfit-rs
#[derive(Debug, Error)]
pub enum CfitError {
    /// Graph build errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors from a graph invocation
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Errors talking to an external service outside of a run
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Workflow definition parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures talking to an LLM provider or an extraction service
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call exceeded its timeout
    #[error("Upstream timeout calling {service}")]
    Timeout { service: String },

    /// Connection could not be established or broke mid-request
    #[error("Upstream unreachable ({service}): {message}")]
    Unreachable { service: String, message: String },

    /// The service answered with a non-success status
    #[error("Upstream {service} returned status {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    /// The response envelope could not be read (not the payload itself)
    #[error("Invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },

    /// API key or endpoint not configured
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

impl TransportError {
    /// Classify a reqwest failure as timeout or unreachable
    pub fn from_reqwest(service: impl Into<String>, err: reqwest::Error) -> Self {
        let service = service.into();
        if err.is_timeout() {
            Self::Timeout { service }
        } else if err.is_decode() {
            Self::InvalidResponse {
                service,
                message: err.to_string(),
            }
        } else {
            Self::Unreachable {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Build-time graph validation errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Two nodes registered under the same name
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// A node tried to use the start or end marker as its name
    #[error("Node name '{0}' is reserved")]
    ReservedName(String),

    /// An edge references a node that was never added
    #[error("Edge {from} -> {to} references an undeclared node")]
    UnknownNode { from: String, to: String },

    /// An edge from a node to itself
    #[error("Self-loop on node: {0}")]
    SelfLoop(String),

    /// No edge leaves the start marker
    #[error("Graph has no edge from the start marker")]
    NoEntry,

    /// Circular dependency detected
    #[error("Circular dependency detected: {0:?}")]
    Cycle(Vec<String>),

    /// Nodes that cannot be reached from the start marker
    #[error("Nodes unreachable from start: {0:?}")]
    Unreachable(Vec<String>),

    /// Nodes with no path to the end marker
    #[error("Nodes with no path to end: {0:?}")]
    DeadEnd(Vec<String>),

    /// A workflow definition names a task unit missing from the pool
    #[error("Task unit '{0}' is not registered")]
    UnknownTask(String),
}

/// A task unit failure. Fatal to the run.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Thread identifiers are used as record keys and file names
    #[error("Invalid thread id: {0:?}")]
    InvalidThreadId(String),

    /// The saver was closed at process shutdown
    #[error("Checkpoint saver is closed")]
    Closed,

    #[error("Checkpoint I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CheckpointError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors surfaced by a graph invocation
#[derive(Debug, Error)]
pub enum RunError {
    /// A node failed; the run was aborted after checkpointing
    #[error("Node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: NodeError,
    },

    /// Another run holds this thread identifier
    #[error("Thread '{0}' already has a run in progress")]
    ThreadBusy(String),

    /// Pending nodes remained but none could become ready
    #[error("Graph stalled with pending nodes: {0:?}")]
    Stalled(Vec<String>),

    /// No topology registered under this name
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl RunError {
    /// The transport failure behind a node error, if any
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            RunError::Node {
                source: NodeError::Transport(t),
                ..
            } => Some(t),
            _ => None,
        }
    }
}
