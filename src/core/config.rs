/*!
 * Configuration
 *
 * Arena geometry, transport and session settings with defaults,
 * validation and environment overrides
 */

use super::errors::SegnetError;
use super::limits::{
    DEFAULT_ARENA_CAPACITY, DEFAULT_RETRY_BACKOFF, DEFAULT_SEGMENT_SIZE, DEFAULT_SEND_RETRIES,
    HEADER_BYTES, MAX_SEGMENT_COUNT, MAX_SEGMENT_SIZE,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding arena capacity (applies to both directions)
pub const ENV_ARENA_CAPACITY: &str = "SEGNET_ARENA_CAPACITY";
/// Environment variable overriding segment size (applies to both directions)
pub const ENV_SEGMENT_SIZE: &str = "SEGNET_SEGMENT_SIZE";
/// Environment variable toggling TCP_NODELAY
pub const ENV_NODELAY: &str = "SEGNET_NODELAY";

/// Geometry of one segment arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ArenaConfig {
    /// Total bytes backing the arena
    pub capacity: usize,
    /// Bytes per segment
    pub segment_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ARENA_CAPACITY,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl ArenaConfig {
    pub const fn new(capacity: usize, segment_size: usize) -> Self {
        Self {
            capacity,
            segment_size,
        }
    }

    /// Number of whole segments the arena holds
    #[inline]
    pub const fn segment_count(&self) -> usize {
        if self.segment_size == 0 {
            0
        } else {
            self.capacity / self.segment_size
        }
    }

    /// Largest payload a framed reservation can carry
    #[inline]
    pub const fn max_payload(&self) -> usize {
        self.segment_size.saturating_sub(HEADER_BYTES)
    }

    /// Check the geometry can back at least one framed segment
    pub fn validate(&self) -> Result<(), String> {
        if self.segment_size <= HEADER_BYTES {
            return Err(format!(
                "segment size {} must exceed the {}-byte frame header",
                self.segment_size, HEADER_BYTES
            ));
        }
        if self.segment_size > MAX_SEGMENT_SIZE {
            return Err(format!(
                "segment size {} exceeds maximum {}",
                self.segment_size, MAX_SEGMENT_SIZE
            ));
        }
        if self.capacity < self.segment_size {
            return Err(format!(
                "capacity {} is smaller than one segment of {} bytes",
                self.capacity, self.segment_size
            ));
        }
        if self.segment_count() > MAX_SEGMENT_COUNT {
            return Err(format!(
                "{} segments exceed the index range",
                self.segment_count()
            ));
        }
        Ok(())
    }
}

/// Per-connection transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TransportConfig {
    /// Arena used for outgoing frames
    pub send_arena: ArenaConfig,
    /// Arena used for incoming headers and bodies
    pub receive_arena: ArenaConfig,
    /// Disable Nagle on TCP streams
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_arena: ArenaConfig::default(),
            receive_arena: ArenaConfig::default(),
            nodelay: true,
        }
    }
}

impl TransportConfig {
    /// Same geometry in both directions
    pub fn symmetric(arena: ArenaConfig) -> Self {
        Self {
            send_arena: arena,
            receive_arena: arena,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SegnetError> {
        self.send_arena
            .validate()
            .map_err(|e| SegnetError::Config(format!("send arena: {}", e)))?;
        self.receive_arena
            .validate()
            .map_err(|e| SegnetError::Config(format!("receive arena: {}", e)))?;
        Ok(())
    }

    /// Defaults overridden by `SEGNET_*` environment variables
    pub fn from_env() -> Result<Self, SegnetError> {
        let mut config = Self::default();

        if let Some(capacity) = env_value::<usize>(ENV_ARENA_CAPACITY)? {
            config.send_arena.capacity = capacity;
            config.receive_arena.capacity = capacity;
        }
        if let Some(segment_size) = env_value::<usize>(ENV_SEGMENT_SIZE)? {
            config.send_arena.segment_size = segment_size;
            config.receive_arena.segment_size = segment_size;
        }
        if let Some(nodelay) = env_value::<bool>(ENV_NODELAY)? {
            config.nodelay = nodelay;
        }

        config.validate()?;
        Ok(config)
    }
}

/// What a session does with a frame whose packet id has no handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPacketPolicy {
    /// Drop the frame and keep the connection
    #[default]
    Ignore,
    /// Drop the frame and disconnect the peer
    Disconnect,
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SessionConfig {
    pub unknown_packet: UnknownPacketPolicy,
    /// Extra attempts for a reply that hit a full send arena
    pub send_retries: u32,
    /// Pause between those attempts, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unknown_packet: UnknownPacketPolicy::default(),
            send_retries: DEFAULT_SEND_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
        }
    }
}

impl SessionConfig {
    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, SegnetError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SegnetError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let config = ArenaConfig::default();
        assert_eq!(config.segment_count(), 32);
        assert_eq!(config.max_payload(), 254);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_header_sized_segments() {
        assert!(ArenaConfig::new(1024, HEADER_BYTES).validate().is_err());
        assert!(ArenaConfig::new(1024, 0).validate().is_err());
    }

    #[test]
    fn test_rejects_capacity_below_one_segment() {
        assert!(ArenaConfig::new(100, 256).validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_segments() {
        let config = ArenaConfig::new(MAX_SEGMENT_SIZE * 2, MAX_SEGMENT_SIZE + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_config_reports_direction() {
        let mut config = TransportConfig::default();
        config.receive_arena.segment_size = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("receive arena"));
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"send_arena": {"segment_size": 512}, "nodelay": false}"#)
                .unwrap();
        assert_eq!(config.send_arena.segment_size, 512);
        assert_eq!(config.send_arena.capacity, DEFAULT_ARENA_CAPACITY);
        assert_eq!(config.receive_arena, ArenaConfig::default());
        assert!(!config.nodelay);
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.unknown_packet, UnknownPacketPolicy::Ignore);
        assert_eq!(config.retry_backoff(), DEFAULT_RETRY_BACKOFF);
    }
}
