//! Sink configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uartlog_core::{UartLogError, UartLogResult};
use uartlog_framing::{FrameFormat, DEFAULT_FRAME_CAPACITY};

/// Default ring buffer capacity in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default number of bytes submitted per flush tick
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Default delay between flush ticks while draining or waiting for the port
pub const DEFAULT_BACKOFF_MS: u64 = 10;

/// Default bound on formatted log messages
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 256;

/// Sink tuning
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// chunk_size = 128
/// format = "checked"
/// max_acl_size = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub buffer_capacity: usize,
    pub chunk_size: usize,
    pub backoff_ms: u64,
    pub format: FrameFormat,
    pub frame_capacity: usize,
    /// Route formatted log messages to the text channel
    pub forward_log_messages: bool,
    pub max_message_len: usize,
    /// Largest ACL payload forwarded by the HCI adapter
    pub max_acl_size: Option<usize>,
    /// Largest SCO payload forwarded by the HCI adapter
    pub max_sco_size: Option<usize>,
    /// Largest ISO payload forwarded by the HCI adapter
    pub max_iso_size: Option<usize>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff_ms: DEFAULT_BACKOFF_MS,
            format: FrameFormat::Direct,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            forward_log_messages: false,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_acl_size: None,
            max_sco_size: None,
            max_iso_size: None,
        }
    }
}

impl SinkConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> UartLogResult<Self> {
        let config: SinkConfig = toml::from_str(text)
            .map_err(|e| UartLogError::ConfigRejected(format!("TOML syntax error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> UartLogResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            UartLogError::ConfigRejected(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check that all sizes are usable
    pub fn validate(&self) -> UartLogResult<()> {
        let sizes = [
            ("buffer_capacity", self.buffer_capacity),
            ("chunk_size", self.chunk_size),
            ("frame_capacity", self.frame_capacity),
            ("max_message_len", self.max_message_len),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(UartLogError::ConfigRejected(format!("{} must not be zero", name)));
            }
        }
        if self.chunk_size > self.buffer_capacity {
            return Err(UartLogError::ConfigRejected(format!(
                "chunk_size {} exceeds buffer_capacity {}",
                self.chunk_size, self.buffer_capacity
            )));
        }
        Ok(())
    }

    /// Backoff interval as a duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
