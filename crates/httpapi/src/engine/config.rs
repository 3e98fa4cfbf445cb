use crate::codec::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_HEADERS};
use std::time::Duration;

const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;
const DEFAULT_WRITE_BUFFER_CAPACITY: usize = 8 * 1024;
const DEFAULT_BODY_BUFFER_CAP: usize = 64 * 1024;
const DEFAULT_LINGER: Duration = Duration::from_secs(2);

/// Limits and buffer sizes applied to every connection an engine accepts.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    max_header_bytes: usize,
    max_headers: usize,
    read_buffer_capacity: usize,
    write_buffer_capacity: usize,
    body_buffer_cap: usize,
    linger: Duration,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Largest request line plus header block accepted before answering 400.
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub fn read_buffer_capacity(&self) -> usize {
        self.read_buffer_capacity
    }

    pub fn write_buffer_capacity(&self) -> usize {
        self.write_buffer_capacity
    }

    /// Entity body bytes buffered per connection before reading from the socket pauses.
    pub fn body_buffer_cap(&self) -> usize {
        self.body_buffer_cap
    }

    /// How long a connection keeps discarding input after a 400 before it is dropped.
    pub fn linger(&self) -> Duration {
        self.linger
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigBuilder::new().build()
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig {
                max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
                max_headers: DEFAULT_MAX_HEADERS,
                read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
                write_buffer_capacity: DEFAULT_WRITE_BUFFER_CAPACITY,
                body_buffer_cap: DEFAULT_BODY_BUFFER_CAP,
                linger: DEFAULT_LINGER,
            },
        }
    }

    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.config.max_header_bytes = max_header_bytes;
        self
    }

    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.config.max_headers = max_headers;
        self
    }

    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.read_buffer_capacity = capacity;
        self
    }

    pub fn write_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.write_buffer_capacity = capacity;
        self
    }

    pub fn body_buffer_cap(mut self, cap: usize) -> Self {
        self.config.body_buffer_cap = cap.max(1);
        self
    }

    pub fn linger(mut self, linger: Duration) -> Self {
        self.config.linger = linger;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_decoder_limits() {
        let config = EngineConfig::default();
        assert_eq!(config.max_header_bytes(), 8 * 1024);
        assert_eq!(config.max_headers(), 64);
        assert_eq!(config.body_buffer_cap(), 64 * 1024);
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::builder().max_headers(8).body_buffer_cap(0).linger(Duration::from_millis(50)).build();
        assert_eq!(config.max_headers(), 8);
        assert_eq!(config.body_buffer_cap(), 1);
        assert_eq!(config.linger(), Duration::from_millis(50));
    }
}
