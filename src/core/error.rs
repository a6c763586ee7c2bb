// SPDX-License-Identifier: MIT OR Apache-2.0

//! CFR Correlator Error Types
//!
//! Every condition here is recoverable by the engine itself: the offending
//! event or record is dropped, counted, and processing continues.

use thiserror::Error;

/// Result type for correlator operations
pub type CfrResult<T> = Result<T, CfrError>;

/// Correlator error types
#[derive(Error, Debug)]
pub enum CfrError {
    #[error("Invalid payload length {length} (allowed 1..={max})")]
    InvalidLength { length: u32, max: u32 },

    #[error("Payload length {length} does not match declared length {declared}")]
    LengthMismatch { length: u32, declared: u32 },

    #[error("Capture {evicted} evicted from slot {slot} by capture {incoming}")]
    Collision {
        slot: usize,
        evicted: u32,
        incoming: u32,
    },

    #[error("Capture {capture_id} timed out waiting for {missing}")]
    Timeout {
        capture_id: u32,
        missing: &'static str,
    },

    #[error("{pool} is full ({capacity} entries)")]
    CapacityExceeded { pool: &'static str, capacity: usize },

    #[error("Duplicate {source_name} delivery for capture {capture_id}")]
    DuplicateDelivery {
        capture_id: u32,
        source_name: &'static str,
    },

    #[error("Malformed DMA header: {message}")]
    MalformedHeader { message: String },

    #[error("DMA buffer at {physical_address:#x} unavailable")]
    BufferUnavailable { physical_address: u64 },

    #[error("Invalid session state: {message}")]
    InvalidState { message: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Malformed record: {message}")]
    MalformedRecord { message: String },

    #[error("Sink error: {message}")]
    Sink {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CfrError {
    pub fn invalid_length(length: u32, max: u32) -> Self {
        Self::InvalidLength { length, max }
    }

    pub fn capacity_exceeded(pool: &'static str, capacity: usize) -> Self {
        Self::CapacityExceeded { pool, capacity }
    }

    pub fn duplicate(capture_id: u32, source_name: &'static str) -> Self {
        Self::DuplicateDelivery {
            capture_id,
            source_name,
        }
    }

    pub fn malformed_header(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
        }
    }

    pub fn malformed_record(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(
        message: impl Into<String>,
        config_key: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    pub fn sink_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Sink {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a generic error from a string
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Short stable name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } | Self::LengthMismatch { .. } => "invalid_length",
            Self::Collision { .. } => "collision",
            Self::Timeout { .. } => "timeout",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::DuplicateDelivery { .. } => "duplicate_delivery",
            Self::MalformedHeader { .. } => "malformed_header",
            Self::BufferUnavailable { .. } => "buffer_unavailable",
            Self::InvalidState { .. } => "invalid_state",
            Self::Configuration { .. } => "configuration",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Sink { .. } => "sink",
            Self::IoError(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

impl From<serde_yaml::Error> for CfrError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML: {}", e))
    }
}

impl From<toml::de::Error> for CfrError {
    fn from(e: toml::de::Error) -> Self {
        Self::configuration(format!("TOML: {}", e))
    }
}

impl From<serde_json::Error> for CfrError {
    fn from(e: serde_json::Error) -> Self {
        Self::other(format!("JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_length_error() {
        let error = CfrError::invalid_length(0, 4096);
        assert!(matches!(error, CfrError::InvalidLength { length: 0, .. }));
        assert_eq!(error.kind(), "invalid_length");
        assert_eq!(
            error.to_string(),
            "Invalid payload length 0 (allowed 1..=4096)"
        );
    }

    #[test]
    fn test_capacity_exceeded_error() {
        let error = CfrError::capacity_exceeded("unassociated client pool", 10);
        assert!(matches!(error, CfrError::CapacityExceeded { capacity: 10, .. }));
        assert!(error.to_string().contains("unassociated client pool"));
    }

    #[test]
    fn test_configuration_error_with_key() {
        let error = CfrError::configuration_with_key("must be > 0", "pool_size");
        match error {
            CfrError::Configuration { config_key, .. } => {
                assert_eq!(config_key.as_deref(), Some("pool_size"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: CfrError = io.into();
        assert_eq!(error.kind(), "io");
    }
}
