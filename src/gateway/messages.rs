//! Gateway wire format and serialization
//!
//! Every frame is a JSON text message `{"event": ..., "data": ...}` decoded
//! into a [`ClientRequest`] or encoded from a [`ServerEvent`].

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::types::{ClientRequest, ServerEvent};

/// Path the WebSocket endpoint is served on
pub const GATEWAY_PATH: &str = "/ws";

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Decode a client frame, rejecting oversized or malformed input
    pub fn parse_request(text: &str, max_bytes: usize) -> MatchmakingResult<ClientRequest> {
        if text.len() > max_bytes {
            return Err(MatchmakingError::InvalidMessage {
                reason: format!(
                    "Frame of {} bytes exceeds limit of {} bytes",
                    text.len(),
                    max_bytes
                ),
            });
        }

        serde_json::from_str(text).map_err(|e| MatchmakingError::InvalidMessage {
            reason: format!("Failed to decode client frame: {}", e),
        })
    }

    /// Encode a server event as a text frame
    pub fn encode_event(event: &ServerEvent) -> MatchmakingResult<String> {
        serde_json::to_string(event).map_err(|e| {
            MatchmakingError::internal(format!("Failed to serialize server event: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorCode, GameMode};

    #[test]
    fn test_parse_request() {
        let request =
            MessageUtils::parse_request(r#"{"event":"leaveQueue","data":{"mode":2}}"#, 1024)
                .unwrap();
        assert_eq!(
            request,
            ClientRequest::LeaveQueue {
                mode: GameMode::new(2)
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage_and_oversized_frames() {
        let error = MessageUtils::parse_request("not json", 1024).unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidMessage);

        let error =
            MessageUtils::parse_request(r#"{"event":"teleport","data":{}}"#, 1024).unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidMessage);

        let error = MessageUtils::parse_request(r#"{"event":"ping"}"#, 8).unwrap_err();
        assert!(matches!(error, MatchmakingError::InvalidMessage { .. }));
    }

    #[test]
    fn test_encode_error_event() {
        let error = MatchmakingError::InvalidMode {
            mode: GameMode::new(5),
        };
        let text = MessageUtils::encode_event(&ServerEvent::error(&error)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "invalidMode");
        assert_eq!(value["data"]["message"], "Invalid game mode: 5");
    }
}
