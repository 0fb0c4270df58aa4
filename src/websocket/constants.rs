//! Message type and close code constants from RFC 6455.

use std::fmt;

/// Close codes defined in RFC 6455, section 11.7.
pub mod close_code {
    pub const NORMAL_CLOSURE: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const NO_STATUS_RECEIVED: u16 = 1005;
    pub const ABNORMAL_CLOSURE: u16 = 1006;
    pub const INVALID_FRAME_PAYLOAD_DATA: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const MANDATORY_EXTENSION: u16 = 1010;
    pub const INTERNAL_SERVER_ERR: u16 = 1011;
    pub const SERVICE_RESTART: u16 = 1012;
    pub const TRY_AGAIN_LATER: u16 = 1013;
    pub const TLS_HANDSHAKE: u16 = 1015;
}

/// Message types defined in RFC 6455, section 11.8.
///
/// The discriminants are the frame opcodes, so `MessageType::Text as u8 == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 encoded text data.
    Text = 1,
    /// Binary data.
    Binary = 2,
    /// Close control message. The payload is a big-endian status code
    /// followed by an optional UTF-8 reason, see
    /// [`format_close_message`](super::format_close_message).
    Close = 8,
    /// Ping control message.
    Ping = 9,
    /// Pong control message.
    Pong = 10,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Text => "text",
            MessageType::Binary => "binary",
            MessageType::Close => "close",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        assert_eq!(MessageType::Text as u8, 1);
        assert_eq!(MessageType::Binary as u8, 2);
        assert_eq!(MessageType::Close as u8, 8);
        assert_eq!(MessageType::Ping as u8, 9);
        assert_eq!(MessageType::Pong as u8, 10);
    }


    #[test]
    fn test_display_names() {
        assert_eq!(MessageType::Text.to_string(), "text");
        assert_eq!(MessageType::Close.to_string(), "close");
    }
}
