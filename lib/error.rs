use thiserror::Error;

/// Every error raised by inputpath.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Resolution failed: {0}")]
    Resolution(String),
    #[error("Sort error: {0}")]
    Sort(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("The graph has a duplicate vertex: {0}")]
    DuplicateVertex(usize),
    #[error("The graph has a duplicate edge from {0} to {1}")]
    DuplicateEdge(usize, usize),
    #[error("Vertex {0} does not exist in graph")]
    GraphVertexNotFound(usize),
    #[error("Edge from {0} to {1} does not exist in graph")]
    GraphEdgeNotFound(usize, usize),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Type not found: {0}")]
    TypeNotFound(String),
    #[error("Block {0} not found")]
    BlockNotFound(usize),
    #[error("Instruction not found at block {0}, index {1}")]
    InstructionNotFound(usize, usize),
    #[error("Method {0} has no body")]
    NoBody(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Errors which abort the current entry point or path, but never the
    /// whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Unsupported(_) | Error::Resolution(_) | Error::Solver(_)
        )
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Error {
        Error::Unsupported(message.into())
    }

    pub fn resolution<S: Into<String>>(message: S) -> Error {
        Error::Resolution(message.into())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
