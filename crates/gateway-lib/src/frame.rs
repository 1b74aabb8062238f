// ============================
// crates/gateway-lib/src/frame.rs
// ============================
//! Text frame codec.
//!
//! The wire format is a command line, a `key:value` header block, a
//! blank line, the body, and a NUL terminator:
//!
//! ```text
//! SEND\n
//! destination:/pub/chat/message\n
//! \n
//! {"content":"hi"}\0
//! ```
//!
//! There is no length prefix; framing relies entirely on the blank-line
//! separator and the terminator byte. A body containing an embedded NUL
//! is a protocol violation the codec does not guard against, a known
//! wire constraint.

/// Frame terminator byte.
pub const TERMINATOR: char = '\0';

/// Commands this gateway recognizes. Anything else is carried through
/// as `Other` and ignored by the dispatcher rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Subscribe,
    Send,
    Connected,
    Message,
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Subscribe => "SUBSCRIBE",
            Command::Send => "SEND",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Other(s) => s,
        }
    }

    fn from_line(line: &str) -> Self {
        match line {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SUBSCRIBE" => Command::Subscribe,
            "SEND" => Command::Send,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            other => Command::Other(other.to_string()),
        }
    }
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Insertion-ordered; duplicate keys keep the first occurrence on
    /// lookup, as a client would see them.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Frame {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to raw text, terminator included.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            out.push_str(k);
            out.push(':');
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(TERMINATOR);
        out
    }
}

/// Result of decoding one delivered chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A keep-alive chunk: empty, a lone newline, or a lone terminator.
    /// Dropped, never an error.
    Heartbeat,
    Frame(Frame),
}

/// Decode one delivered message chunk.
pub fn decode(raw: &str) -> Decoded {
    if raw.is_empty() || raw == "\n" || raw == "\0" {
        return Decoded::Heartbeat;
    }

    let mut lines = raw.split('\n');
    let command = Command::from_line(lines.next().unwrap_or_default());

    let mut headers = Vec::new();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        // Exactly one `:` separates key from value; anything else is
        // silently skipped, not a protocol error.
        let mut parts = line.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(v), None) if !k.is_empty() && !v.is_empty() => {
                headers.push((k.to_string(), v.to_string()));
            }
            _ => {}
        }
    }

    let mut body = lines.collect::<Vec<_>>().join("\n");
    if body.ends_with(TERMINATOR) {
        body.pop();
    }

    Decoded::Frame(Frame {
        command,
        headers,
        body,
    })
}

/// Build an outbound `MESSAGE` frame for a destination with a JSON body.
pub fn message(destination: &str, body: String) -> Frame {
    Frame {
        command: Command::Message,
        headers: vec![
            ("destination".to_string(), destination.to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body,
    }
}

/// The single reply to `CONNECT`/`STOMP`.
pub fn connected() -> Frame {
    Frame {
        command: Command::Connected,
        headers: vec![("version".to_string(), "1.2".to_string())],
        body: String::new(),
    }
}
