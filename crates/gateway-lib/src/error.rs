// ============================
// crates/gateway-lib/src/error.rs
// ============================
//! Central error type for the gateway.
//!
//! The propagation policy is deliberate: nothing in here ever takes a
//! connection or a room down. Handlers log and drop on error; the
//! variants exist so the drop sites can say *why*.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The destination was recognized but the body did not match its
    /// payload shape. Logged and dropped at the dispatch boundary.
    #[error("unrecognized payload for {destination}: {reason}")]
    UnrecognizedPayload {
        destination: String,
        reason: String,
    },

    /// The per-room actor is gone; treated as a dropped command.
    #[error("room worker channel closed")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GatewayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GatewayError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = GatewayError::UnrecognizedPayload {
            destination: "/pub/studies/enter".to_string(),
            reason: "missing field `studyId`".to_string(),
        };
        assert!(err.to_string().contains("/pub/studies/enter"));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn from_impls() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(GatewayError::from(io), GatewayError::Io(_)));

        let json = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        assert!(matches!(GatewayError::from(json), GatewayError::Json(_)));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        drop(rx);
        let send_err = tx.send(1).unwrap_err();
        assert!(matches!(
            GatewayError::from(send_err),
            GatewayError::ChannelClosed
        ));
    }
}
