use thiserror::Error;

use crate::datatypes::{Axis, ElementId, NodeId};

pub type Result<T> = std::result::Result<T, CouplerError>;

/// Fatal errors. Any of these aborts the run before an output deck exists.
#[derive(Debug, Error)]
pub enum CouplerError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Malformed deck at line {line}: {reason}")]
    MalformedDeck { line: usize, reason: String },

    #[error("Missing part: no part named '{name}'")]
    MissingPart { name: String },

    #[error("Missing node: element {element} of part '{part}' references undefined node {node}")]
    MissingNode {
        part: String,
        element: ElementId,
        node: NodeId,
    },

    #[error("Incomplete geometry: part '{part}' has {found}/8 corners (missing {missing})")]
    IncompleteGeometry {
        part: String,
        found: usize,
        missing: String,
    },

    #[error("Degenerate unit cell: part '{part}' has extent {extent} along {axis}")]
    DegenerateUnitCell {
        part: String,
        axis: Axis,
        extent: f64,
    },

    #[error("Invalid corner ordering in macro element {element}: {reason}")]
    InvalidCornerOrdering { element: ElementId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single data line that could not be turned into a record. Recovered
/// locally by the parser; never aborts a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}
