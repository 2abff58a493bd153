//! Error types for the tracker
//!
//! Only conditions that indicate corrupted input or an unusable configuration
//! are errors. Per-track failures (propagation, rotation, broad roads) are
//! filtering outcomes and never surface here.

use std::fmt;

use crate::cluster::ClusterId;

/// Errors that stop a reconstruction pass
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// A packed cluster locator points outside the loaded cluster store
    InvalidLocator {
        /// The offending locator
        id: ClusterId,
        /// Which component was out of range
        component: &'static str,
    },

    /// A readout segment id outside the detector layout
    InvalidSegment {
        /// Segment id as received
        id: usize,
        /// Exclusive upper bound of valid ids
        limit: usize,
    },

    /// Configuration error
    Configuration {
        /// Description of the configuration issue
        description: String,
    },
}

impl TrackerError {
    /// Shorthand for a configuration error
    pub fn configuration(description: impl Into<String>) -> Self {
        TrackerError::Configuration {
            description: description.into(),
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::InvalidLocator { id, component } => {
                write!(f, "Invalid cluster locator {}: {} out of range", id, component)
            }
            TrackerError::InvalidSegment { id, limit } => {
                write!(f, "Invalid segment id {} (valid ids are below {})", id, limit)
            }
            TrackerError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::configuration(format!("malformed configuration: {}", e))
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(e: std::io::Error) -> Self {
        TrackerError::configuration(format!("cannot read configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_error_display() {
        let id = ClusterId::new(3, 17, 42).unwrap();
        let err = TrackerError::InvalidLocator {
            id,
            component: "row",
        };
        let text = err.to_string();
        assert!(text.contains("row"));
        assert!(text.contains("3/17/42"));
    }

    #[test]
    fn test_segment_error_display() {
        let err = TrackerError::InvalidSegment { id: 9000, limit: 5000 };
        assert!(err.to_string().contains("9000"));
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: TrackerError = parse.unwrap_err().into();
        assert!(matches!(err, TrackerError::Configuration { .. }));
    }
}
