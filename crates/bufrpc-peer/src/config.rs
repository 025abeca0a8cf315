use std::sync::Arc;

use bufrpc_frame::{ErrorEncoding, FrameConfig, SharedErrorCodec, DEFAULT_MAX_FRAME_SIZE};

/// Default chunk size for connection reads.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for an RPC endpoint.
#[derive(Clone)]
pub struct RpcConfig {
    /// Largest accepted incoming payload, in bytes.
    pub max_frame_size: usize,
    /// Error codec for methods that don't set their own.
    pub error_encoding: SharedErrorCodec,
    /// Bytes requested per read by the connection driver.
    pub read_buffer_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            error_encoding: Arc::new(ErrorEncoding),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl RpcConfig {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }
}

impl std::fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConfig")
            .field("max_frame_size", &self.max_frame_size)
            .field("error_encoding", &"<codec>")
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.max_frame_size, 8 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, 8 * 1024);
        assert_eq!(config.frame_config().max_frame_size, config.max_frame_size);
    }

    #[test]
    fn debug_hides_codec() {
        let rendered = format!("{:?}", RpcConfig::default());
        assert!(rendered.contains("max_frame_size"));
        assert!(rendered.contains("<codec>"));
    }
}
