//! STOMP 1.2 text frames.
//!
//! A frame is a command line, zero or more `name:value` header lines, a blank
//! line, and a body terminated by NUL. Frames travel one per WebSocket text
//! message, so the decoder works on a complete message rather than a byte
//! stream.
//!
//! Header values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame except
//! `CONNECT` and `CONNECTED`, which STOMP exempts for 1.0 compatibility.

use std::fmt;

use crate::ProtocolError;

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client opens a session.
    Connect,
    /// Server accepted the session.
    Connected,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client drops a subscription.
    Unsubscribe,
    /// Client publishes to a destination.
    Send,
    /// Server delivers to a subscription.
    Message,
    /// Server acknowledges a receipt request.
    Receipt,
    /// Server reports a failure. The server closes the link afterwards.
    Error,
    /// Client closes the session.
    Disconnect,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn parse(line: &str) -> Result<Self, ProtocolError> {
        let command = match line {
            // STOMP is accepted as a synonym of CONNECT.
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            other => return Err(ProtocolError::UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; lookups use the first.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// `CONNECT` frame presenting a bearer token.
    pub fn connect(host: &str, bearer_token: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
            .with_header("Authorization", format!("Bearer {bearer_token}"))
    }

    /// `SUBSCRIBE` frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe).with_header("id", id).with_header("destination", destination)
    }

    /// `UNSUBSCRIBE` frame.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame with a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// `DISCONNECT` frame.
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Serialize to wire text, including the NUL terminator.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for heart-beats (messages made only of EOLs).
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let text = text.split_once('\0').map_or(text, |(frame, _)| frame);
        let (head, body) = match text.find("\n\n") {
            Some(i) => (&text[..i], &text[i + 2..]),
            None => match text.find("\r\n\r\n") {
                Some(i) => (&text[..i], &text[i + 4..]),
                None => (text, ""),
            },
        };

        let mut lines = head.lines();
        let command_line = lines.next().map(str::trim_end).ok_or(ProtocolError::MissingCommand)?;
        if command_line.is_empty() {
            return Err(ProtocolError::MissingCommand);
        }
        let command = Command::parse(command_line)?;
        let unescape_values = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_owned()))?;
            if unescape_values {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        Ok(Some(Self { command, headers, body: body.to_owned() }))
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    if !raw.contains('\\') {
        return Ok(raw.to_owned());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(encoded: &str) -> String {
        encoded.replace('\0', "^@")
    }

    #[test]
    fn subscribe_frame_encoding() {
        let frame = Frame::subscribe("sub-1", "/conversation/7");
        insta::assert_snapshot!(visible(&frame.encode()), @r"
        SUBSCRIBE
        id:sub-1
        destination:/conversation/7

        ^@
        ");
    }

    #[test]
    fn connect_frame_does_not_escape_headers() {
        let encoded = Frame::connect("localhost", "abc").encode();
        assert!(encoded.starts_with("CONNECT\naccept-version:1.2\n"));
        assert!(encoded.contains("\nAuthorization:Bearer abc\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn send_frame_escapes_header_values() {
        let frame = Frame::send("/a:b", "{}");
        let encoded = frame.encode();
        assert!(encoded.contains("destination:/a\\cb\n"));

        let decoded = Frame::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.header("destination"), Some("/a:b"));
        assert_eq!(decoded.body, "{}");
    }

    #[test]
    fn decodes_server_message() {
        let text = "MESSAGE\nsubscription:sub-3\nmessage-id:m-1\ndestination:/conversation/4\n\n{\"content\":\"hi\"}\0";
        let frame = Frame::decode(text).unwrap().unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-3"));
        assert_eq!(frame.body, "{\"content\":\"hi\"}");
    }

    #[test]
    fn connected_frame_keeps_raw_header_values() {
        let frame = Frame::decode("CONNECTED\nversion:1.2\nserver:x\\y\n\n\0").unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("server"), Some("x\\y"));
    }

    #[test]
    fn heartbeat_is_not_a_frame() {
        assert!(Frame::decode("\n").unwrap().is_none());
        assert!(Frame::decode("\r\n").unwrap().is_none());
    }

    #[test]
    fn leading_heartbeats_are_skipped() {
        let frame = Frame::decode("\n\nRECEIPT\nreceipt-id:1\n\n\0").unwrap().unwrap();
        assert_eq!(frame.command, Command::Receipt);
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = Frame::decode("MESSAGE\nfoo:first\nfoo:second\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("first"));
        assert_eq!(frame.headers.len(), 2);
    }

    #[test]
    fn crlf_frames_decode() {
        let frame = Frame::decode("ERROR\r\nmessage:bad token\r\n\r\ndetails\0").unwrap().unwrap();
        assert_eq!(frame.command, Command::Error);
        assert_eq!(frame.header("message"), Some("bad token"));
        assert_eq!(frame.body, "details");
    }

    #[test]
    fn rejects_unknown_command() {
        let err = Frame::decode("PUBLISH\n\n\0").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(c) if c == "PUBLISH"));
    }

    #[test]
    fn rejects_header_without_separator() {
        let err = Frame::decode("MESSAGE\nbroken\n\n\0").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
    }

    #[test]
    fn rejects_undefined_escape() {
        let err = Frame::decode("MESSAGE\nfoo:a\\tb\n\n\0").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEscape(_)));
    }
}
