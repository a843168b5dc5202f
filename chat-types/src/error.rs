//! Error types for the Veil wire format.

use thiserror::Error;

/// Errors raised while encoding or decoding realtime events.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON encoding failed
    #[error("encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding failed
    #[error("decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Event name not part of the protocol
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::UnknownEvent("call:ring".into());
        assert_eq!(err.to_string(), "unknown event: call:ring");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
