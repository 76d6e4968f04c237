//! Wire framing for the relay sockets
//!
//! Both directions carry opaque text frames. The literal text `close` is the
//! session-termination control token. To send that word as real content a
//! peer prefixes it with a backslash: `\close` is delivered as the text
//! `close`, `\\close` as `\close`, and so on. Every other frame is content
//! byte-for-byte.

/// Reserved frame that ends a session
pub const CONTROL_TOKEN: &str = "close";

const ESCAPE: char = '\\';

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Ordinary message content, already unescaped
    Content(String),
    /// The control token
    Control,
}

impl Frame {
    pub fn parse(raw: &str) -> Self {
        if raw == CONTROL_TOKEN {
            return Frame::Control;
        }

        let unescaped = raw.trim_start_matches(ESCAPE);
        if unescaped == CONTROL_TOKEN && unescaped.len() < raw.len() {
            return Frame::Content(raw[ESCAPE.len_utf8()..].to_string());
        }

        Frame::Content(raw.to_string())
    }
}

/// Frames queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Forward as a text frame
    Text(String),
    /// Send a close frame and stop writing
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_token() {
        assert_eq!(Frame::parse("close"), Frame::Control);
    }

    #[test]
    fn test_plain_content_passes_through() {
        assert_eq!(Frame::parse("hello"), Frame::Content("hello".to_string()));
        assert_eq!(Frame::parse(""), Frame::Content(String::new()));
        assert_eq!(Frame::parse("Close"), Frame::Content("Close".to_string()));
        assert_eq!(Frame::parse(" close"), Frame::Content(" close".to_string()));
        assert_eq!(Frame::parse("\\hello"), Frame::Content("\\hello".to_string()));
    }

    #[test]
    fn test_escaped_control_token_is_content() {
        assert_eq!(Frame::parse("\\close"), Frame::Content("close".to_string()));
        assert_eq!(Frame::parse("\\\\close"), Frame::Content("\\close".to_string()));
    }

    #[test]
    fn test_only_backslash_prefixed_token_is_unescaped() {
        assert_eq!(Frame::parse("\\closed"), Frame::Content("\\closed".to_string()));
        assert_eq!(Frame::parse("\\"), Frame::Content("\\".to_string()));
        assert_eq!(Frame::parse("close\\"), Frame::Content("close\\".to_string()));
    }
}
