//! STOMP 1.2 client transport.
//!
//! A deliberately small client: one TCP session, CONNECT/CONNECTED
//! handshake, receipt-confirmed SEND frames, DISCONNECT on close. Messages
//! are published through the broker's `/exchange/<name>/<routing-key>`
//! destination convention, so the pre-provisioned topic exchange does the
//! routing; this client never declares anything.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use pushrelay_domain::Message;

use crate::config::{BrokerConfig, BrokerProtocol};
use crate::error::{BrokerError, BrokerResult};
use crate::transport::{BrokerConnector, BrokerTransport};

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

/// One STOMP frame: command, headers in order, body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Frame {
            command: command.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire bytes: command, headers, blank line, body, NUL.
    pub fn encode(&self) -> Vec<u8> {
        // CONNECT/CONNECTED are exempt from header escaping per STOMP 1.2.
        let escaped = !matches!(self.command.as_str(), "CONNECT" | "CONNECTED");
        let mut out = Vec::with_capacity(self.body.len() + 64);
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escaped {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parse wire bytes (without the trailing NUL) into a frame.
    pub fn parse(bytes: &[u8]) -> BrokerResult<Frame> {
        // Tolerate EOL keep-alives between frames.
        let start = bytes
            .iter()
            .position(|&b| b != b'\n' && b != b'\r')
            .unwrap_or(bytes.len());
        let bytes = &bytes[start..];
        if bytes.is_empty() {
            return Err(BrokerError::Protocol("empty frame".to_string()));
        }

        let (head, body) = split_head_body(bytes);
        let head = std::str::from_utf8(head)
            .map_err(|_| BrokerError::Protocol("non-UTF-8 frame header section".to_string()))?;

        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = lines
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BrokerError::Protocol("frame without command".to_string()))?
            .to_string();
        let escaped = !matches!(command.as_str(), "CONNECT" | "CONNECTED");

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                BrokerError::Protocol(format!("malformed header line {line:?}"))
            })?;
            if escaped {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Frame {
            command,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Split a frame at the blank line separating headers from body.
fn split_head_body(bytes: &[u8]) -> (&[u8], &[u8]) {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            if j < bytes.len() && bytes[j] == b'\r' {
                j += 1;
            }
            if j >= bytes.len() {
                return (&bytes[..i], &[]);
            }
            if bytes[j] == b'\n' {
                return (&bytes[..i], &bytes[j + 1..]);
            }
        }
        i += 1;
    }
    (bytes, &[])
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> BrokerResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(BrokerError::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Read one NUL-terminated frame from the broker.
async fn read_frame<R>(reader: &mut R) -> BrokerResult<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .read_until(0, &mut buf)
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;
    if n == 0 {
        return Err(BrokerError::Transport(
            "connection closed by broker".to_string(),
        ));
    }
    if buf.last() == Some(&0) {
        buf.pop();
    }
    Frame::parse(&buf)
}

/// Map a broker ERROR frame to the matching error kind.
///
/// RabbitMQ reports a missing or wrongly-typed exchange as a `not_found` /
/// `precondition_failed` channel error in the frame text; everything else is
/// a plain rejection. Both are non-retriable.
fn classify_error(frame: &Frame) -> BrokerError {
    let mut reason = frame.get("message").unwrap_or("").to_string();
    let body = String::from_utf8_lossy(&frame.body);
    if !body.trim().is_empty() {
        if !reason.is_empty() {
            reason.push_str(": ");
        }
        reason.push_str(body.trim());
    }
    let lowered = reason.to_lowercase();
    if lowered.contains("not_found") || lowered.contains("precondition_failed") {
        BrokerError::ExchangeNotFound { reason }
    } else {
        BrokerError::Rejected { reason }
    }
}

// ---------------------------------------------------------------------------
// Connector / transport
// ---------------------------------------------------------------------------

/// Opens STOMP sessions from a [`BrokerConfig`].
pub struct StompConnector {
    config: BrokerConfig,
}

impl StompConnector {
    pub fn new(config: BrokerConfig) -> Self {
        StompConnector { config }
    }
}

#[async_trait]
impl BrokerConnector for StompConnector {
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerTransport>> {
        if self.config.protocol != BrokerProtocol::Stomp {
            return Err(BrokerError::UnsupportedProtocol(self.config.protocol));
        }
        let addr = self.config.addr();
        let handshake = handshake(&self.config, &addr);
        match tokio::time::timeout(self.config.connect_timeout(), handshake).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectTimeout {
                timeout_ms: self.config.connect_timeout_ms,
            }),
        }
    }
}

async fn handshake(config: &BrokerConfig, addr: &str) -> BrokerResult<Box<dyn BrokerTransport>> {
    let connection_err = |reason: String| BrokerError::Connection {
        addr: addr.to_string(),
        reason,
    };

    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| connection_err(e.to_string()))?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let connect = Frame::new("CONNECT")
        .header("accept-version", "1.2")
        .header("host", &config.vhost)
        .header("login", &config.username)
        .header("passcode", &config.password)
        .header("heart-beat", "0,0");
    writer
        .write_all(&connect.encode())
        .await
        .map_err(|e| connection_err(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| connection_err(e.to_string()))?;

    let reply = read_frame(&mut reader).await.map_err(|e| match e {
        BrokerError::Transport(reason) => connection_err(reason),
        other => other,
    })?;
    match reply.command.as_str() {
        "CONNECTED" => {
            debug!(addr = %addr, version = reply.get("version").unwrap_or("?"), "stomp session established");
            Ok(Box::new(StompTransport {
                reader,
                writer,
                exchange: config.exchange.clone(),
                persistent: config.persistent,
                next_receipt: 0,
            }))
        }
        "ERROR" => Err(connection_err(match classify_error(&reply) {
            BrokerError::Rejected { reason } | BrokerError::ExchangeNotFound { reason } => reason,
            other => other.to_string(),
        })),
        other => Err(BrokerError::Protocol(format!(
            "expected CONNECTED, broker sent {other}"
        ))),
    }
}

/// One open STOMP session.
#[derive(Debug)]
pub struct StompTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    exchange: String,
    persistent: bool,
    next_receipt: u64,
}

#[async_trait]
impl BrokerTransport for StompTransport {
    async fn send(&mut self, message: &Message) -> BrokerResult<()> {
        self.next_receipt += 1;
        let receipt_id = format!("pr-{}", self.next_receipt);
        let destination = format!("/exchange/{}/{}", self.exchange, message.routing_key);

        let frame = Frame::new("SEND")
            .header("destination", &destination)
            .header("content-type", message.content_type)
            .header("content-length", &message.payload.len().to_string())
            .header("persistent", if self.persistent { "true" } else { "false" })
            .header("receipt", &receipt_id)
            .with_body(message.payload.clone());
        self.writer
            .write_all(&frame.encode())
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        loop {
            let reply = read_frame(&mut self.reader).await?;
            match reply.command.as_str() {
                "RECEIPT" if reply.get("receipt-id") == Some(receipt_id.as_str()) => {
                    return Ok(());
                }
                // A stale receipt from a previous send on this session.
                "RECEIPT" => continue,
                "ERROR" => return Err(classify_error(&reply)),
                // Publish-only session: nothing else is expected.
                other => {
                    debug!(command = %other, "ignoring unexpected frame");
                    continue;
                }
            }
        }
    }

    async fn close(&mut self) -> BrokerResult<()> {
        // Best effort: a session that breaks while saying goodbye is closed
        // enough.
        let bye = Frame::new("DISCONNECT").encode();
        if let Err(e) = self.writer.write_all(&bye).await {
            debug!(error = %e, "disconnect frame not delivered");
        }
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frame_round_trips() {
        let frame = Frame::new("SEND")
            .header("destination", "/exchange/hg-events/proj.default.changeset")
            .header("content-type", "application/json")
            .with_body(b"{\"a\":1}".to_vec());
        let mut encoded = frame.encode();
        assert_eq!(encoded.pop(), Some(0));
        let parsed = Frame::parse(&encoded).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn header_values_are_escaped_on_the_wire() {
        let frame = Frame::new("SEND").header("odd", "a:b\nc\\d");
        let mut encoded = frame.encode();
        encoded.pop();
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.contains("odd:a\\cb\\nc\\\\d"));
        let parsed = Frame::parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.get("odd"), Some("a:b\nc\\d"));
    }

    #[test]
    fn connected_frame_parses_without_unescaping() {
        let parsed = Frame::parse(b"CONNECTED\nversion:1.2\nserver:RabbitMQ/3.12\n\n").unwrap();
        assert_eq!(parsed.command, "CONNECTED");
        assert_eq!(parsed.get("version"), Some("1.2"));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn crlf_frames_parse() {
        let parsed =
            Frame::parse(b"RECEIPT\r\nreceipt-id:pr-1\r\n\r\n").unwrap();
        assert_eq!(parsed.command, "RECEIPT");
        assert_eq!(parsed.get("receipt-id"), Some("pr-1"));
    }

    #[test]
    fn leading_keepalive_newlines_are_skipped() {
        let parsed = Frame::parse(b"\n\nRECEIPT\nreceipt-id:pr-2\n\n").unwrap();
        assert_eq!(parsed.command, "RECEIPT");
    }

    #[test]
    fn bad_escape_sequence_is_a_protocol_error() {
        let result = Frame::parse(b"RECEIPT\nreceipt-id:pr\\x1\n\n");
        assert!(matches!(result, Err(BrokerError::Protocol(_))));
    }

    #[test]
    fn missing_exchange_error_is_distinguishable() {
        let frame = Frame::new("ERROR")
            .header("message", "not_found")
            .with_body(b"NOT_FOUND - no exchange 'hg-events' in vhost '/'\n".to_vec());
        let err = classify_error(&frame);
        assert!(matches!(err, BrokerError::ExchangeNotFound { .. }));
        assert!(!err.is_retriable());
    }

    #[test]
    fn generic_error_frame_is_a_rejection() {
        let frame = Frame::new("ERROR").header("message", "access_refused");
        let err = classify_error(&frame);
        assert!(matches!(err, BrokerError::Rejected { .. }));
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn amqp_protocol_selection_is_reported_unsupported() {
        let config: BrokerConfig = serde_json::from_str(
            r#"{
                "host": "h", "username": "u", "password": "p",
                "exchange": "x", "protocol": "amqp"
            }"#,
        )
        .unwrap();
        let err = StompConnector::new(config).connect().await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::UnsupportedProtocol(BrokerProtocol::Amqp)
        ));
        assert!(!err.is_retriable());
    }
}
