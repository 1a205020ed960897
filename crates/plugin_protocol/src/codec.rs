//! JSON body codec for protocol frames.
//!
//! Bodies are `serde_json` documents. Length framing is handled by
//! [`crate::transport`]; the size limit is enforced here as well so an
//! oversized message is refused before it reaches the socket.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Largest body accepted in either direction (10 MB).
pub const MAX_FRAME_SIZE: usize = 10_000_000;

/// Serializes a message into a frame body.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(body)
}

/// Deserializes a frame body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(serde_json::from_slice(body)?)
}

/// The minimum needed to answer an event: its id and whether an answer is owed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventHeader {
    pub event_id: String,
    #[serde(default)]
    pub expects_response: bool,
}

#[derive(Deserialize)]
struct HeaderFrame {
    payload: HeaderPayload,
}

#[derive(Deserialize)]
struct HeaderPayload {
    event: EventHeader,
}

/// Pulls the event header out of a host frame whose typed decode failed.
///
/// Returns `None` when the body is not an event frame at all.
pub fn peek_event_header(body: &[u8]) -> Option<EventHeader> {
    serde_json::from_slice::<HeaderFrame>(body)
        .ok()
        .map(|frame| frame.payload.event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{HostPayload, HostToPlugin};

    #[test]
    fn oversized_body_is_refused() {
        let body = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            decode::<serde_json::Value>(&body),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn malformed_body_is_a_serialization_error() {
        assert!(matches!(
            decode::<HostToPlugin>(b"{not json"),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn header_survives_unknown_payload_shape() {
        let body = br#"{"plugin_id":"p","payload":{"event":{
            "event_id":"e9","type":"PLAYER_DANCE","expects_response":true,
            "payload":{"player_dance":{"style":"moonwalk"}}}}}"#;
        assert!(decode::<HostToPlugin>(body).is_err());
        assert_eq!(
            peek_event_header(body),
            Some(EventHeader {
                event_id: "e9".to_string(),
                expects_response: true,
            })
        );
    }

    #[test]
    fn non_event_frames_have_no_header() {
        let body = br#"{"payload":{"shutdown":{"reason":"bye"}}}"#;
        assert!(peek_event_header(body).is_none());
        let decoded: HostToPlugin = decode(body).unwrap();
        assert!(matches!(decoded.payload, HostPayload::Shutdown(_)));
    }
}
