use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failures reported by the container runtime, classified so callers can
/// branch on them instead of matching on message text.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime daemon could not be reached at all.
    #[error("container runtime is not reachable: {0}")]
    Unavailable(String),

    /// The addressed container, volume or network (or the attachment) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("runtime command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unexpected runtime output: {0}")]
    InvalidOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RuntimeError::Unavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum K3dError {
    Runtime(#[from] RuntimeError),
    Config(String),
    Io(#[from] std::io::Error),
    Serialization(String),
    /// A step of the registry creation path failed.
    Creation {
        step: &'static str,
        source: Box<K3dError>,
    },
    Lock(String),
    Internal(String),
}

impl K3dError {
    /// Wrap an error with the name of the creation sub-step that produced it.
    pub fn creation(step: &'static str, err: impl Into<K3dError>) -> Self {
        K3dError::Creation {
            step,
            source: Box::new(err.into()),
        }
    }

    /// True when the runtime itself could not be reached, at any wrapping depth.
    pub fn is_unavailable(&self) -> bool {
        match self {
            K3dError::Runtime(e) => e.is_unavailable(),
            K3dError::Creation { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, K3dError::Runtime(e) if e.is_not_found())
    }
}

impl Display for K3dError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            K3dError::Runtime(RuntimeError::Unavailable(s)) => {
                write!(f, "Container runtime is not reachable: {}\n\n", s)?;
                write!(f, "Fix:\n")?;
                write!(f, "  • Start Docker Desktop, or\n")?;
                write!(f, "  • Run: sudo systemctl start docker\n")?;
                write!(f, "  • Verify: docker ps")
            }
            K3dError::Runtime(e) => write!(f, "Runtime error: {}", e),
            K3dError::Config(s) => write!(f, "Configuration error: {}", s),
            K3dError::Io(e) => write!(f, "I/O error: {}", e),
            K3dError::Serialization(s) => write!(f, "Serialization error: {}", s),
            K3dError::Creation { step, source } => {
                write!(f, "Registry creation failed while {}: {}", step, source)
            }
            K3dError::Lock(s) => write!(f, "Lock error: {}", s),
            K3dError::Internal(s) => write!(f, "Internal error: {}", s),
        }
    }
}

impl From<serde_yaml_ng::Error> for K3dError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        K3dError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for K3dError {
    fn from(err: serde_json::Error) -> Self {
        K3dError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, K3dError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_error_names_step() {
        let err = K3dError::creation(
            "creating volume",
            RuntimeError::Conflict("volume exists".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("creating volume"));
        assert!(msg.contains("volume exists"));
    }

    #[test]
    fn test_unavailable_seen_through_creation_wrapper() {
        let err = K3dError::creation(
            "starting container",
            RuntimeError::Unavailable("connection refused".into()),
        );
        assert!(err.is_unavailable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_unavailable_display_has_fix_hints() {
        let err = K3dError::from(RuntimeError::Unavailable("socket missing".into()));
        let msg = err.to_string();
        assert!(msg.contains("not reachable"));
        assert!(msg.contains("docker ps"));
    }

    #[test]
    fn test_yaml_error_maps_to_serialization() {
        let parse: std::result::Result<serde_yaml_ng::Value, _> =
            serde_yaml_ng::from_str("mirrors: [unclosed");
        let err: K3dError = parse.unwrap_err().into();
        assert!(matches!(err, K3dError::Serialization(_)));
    }
}
