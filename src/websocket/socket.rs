//! The underlying connection handle given to websocket handlers.
//!
//! A [`Socket`] is a pair of channels into the bridge actor that owns the
//! actix websocket context: inbound frames arrive on an unbounded receiver,
//! outbound frames are pushed onto an unbounded sender. Control frames are
//! answered while reading: pings get a pong, a close frame is echoed once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_http::ws::{CloseCode, CloseReason, Item, Message, ProtocolError};
use actix_web::web::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::error::WsError;
use super::constants::{close_code, MessageType};

/// A frame as produced by the actix websocket codec.
pub(crate) type Inbound = Result<Message, ProtocolError>;

/// Per-socket limits, derived from the upgrade [`Config`](super::Config).
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
    /// Maximum size of a reassembled message. `None` leaves only the
    /// codec's per-frame limit in place.
    pub read_limit: Option<usize>,
    /// Outbound data messages larger than this are sent as continuation
    /// frames of at most this size. Zero disables fragmentation.
    pub write_buffer_size: usize,
}

/// Builds a socket plus the bridge-side ends of its channels.
pub(crate) fn pair(
    options: SocketOptions,
) -> (Socket, mpsc::UnboundedSender<Inbound>, mpsc::UnboundedReceiver<Message>) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let close_sent = Arc::new(AtomicBool::new(false));

    let socket = Socket {
        reader: ReadHalf {
            inbound: inbound_rx,
            outbound: outbound_tx.clone(),
            close_sent: close_sent.clone(),
            read_limit: options.read_limit,
            partial: None,
        },
        writer: WriteHalf {
            outbound: outbound_tx,
            close_sent,
            write_buffer_size: options.write_buffer_size,
        },
    };

    (socket, inbound_tx, outbound_rx)
}

/// An established websocket connection.
#[derive(Debug)]
pub struct Socket {
    reader: ReadHalf,
    writer: WriteHalf,
}

impl Socket {
    /// Waits for the next complete text or binary message.
    pub async fn read_message(&mut self) -> Result<(MessageType, Bytes), WsError> {
        self.reader.read_message().await
    }

    pub fn write_message(&self, kind: MessageType, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.writer.write_message(kind, data)
    }

    pub fn write_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.writer.write_text(text)
    }

    pub fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        self.writer.close(code, reason)
    }

    /// Splits the socket so reading and writing can run in separate tasks.
    pub fn split(self) -> (ReadHalf, WriteHalf) {
        (self.reader, self.writer)
    }
}

/// Reading side of a [`Socket`].
#[derive(Debug)]
pub struct ReadHalf {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    // control replies (pong, close echo)
    outbound: mpsc::UnboundedSender<Message>,
    close_sent: Arc<AtomicBool>,
    read_limit: Option<usize>,
    partial: Option<(MessageType, BytesMut)>,
}

impl ReadHalf {
    pub async fn read_message(&mut self) -> Result<(MessageType, Bytes), WsError> {
        loop {
            let frame = match self.inbound.recv().await {
                Some(Ok(frame)) => frame,
                Some(Err(ProtocolError::Overflow)) => return Err(WsError::ReadLimit),
                Some(Err(e)) => return Err(WsError::Protocol(e.to_string())),
                None => return Err(WsError::ConnectionClosed),
            };

            match frame {
                Message::Text(text) => return self.complete(MessageType::Text, text.into_bytes()),
                Message::Binary(data) => return self.complete(MessageType::Binary, data),
                Message::Continuation(item) => {
                    if let Some(message) = self.continuation(item)? {
                        return Ok(message);
                    }
                }
                Message::Ping(data) => {
                    // a closed outbound channel surfaces on the next recv
                    let _ = self.outbound.send(Message::Pong(data));
                }
                Message::Pong(_) | Message::Nop => {}
                Message::Close(reason) => return Err(self.closed(reason)),
            }
        }
    }

    fn complete(&self, kind: MessageType, data: Bytes) -> Result<(MessageType, Bytes), WsError> {
        self.check_limit(data.len())?;
        Ok((kind, data))
    }

    fn continuation(&mut self, item: Item) -> Result<Option<(MessageType, Bytes)>, WsError> {
        match item {
            Item::FirstText(data) => self.start_partial(MessageType::Text, data)?,
            Item::FirstBinary(data) => self.start_partial(MessageType::Binary, data)?,
            Item::Continue(data) => self.extend_partial(&data)?,
            Item::Last(data) => {
                self.extend_partial(&data)?;
                let (kind, buf) = self.partial.take().ok_or_else(no_leading_frame)?;
                let data = buf.freeze();
                if kind == MessageType::Text && std::str::from_utf8(&data).is_err() {
                    return Err(WsError::InvalidUtf8);
                }
                return Ok(Some((kind, data)));
            }
        }
        Ok(None)
    }

    fn start_partial(&mut self, kind: MessageType, data: Bytes) -> Result<(), WsError> {
        if self.partial.is_some() {
            return Err(WsError::Protocol("continuation already started".to_string()));
        }
        self.check_limit(data.len())?;
        self.partial = Some((kind, BytesMut::from(&data[..])));
        Ok(())
    }

    fn extend_partial(&mut self, data: &[u8]) -> Result<(), WsError> {
        let len = match &self.partial {
            Some((_, buf)) => buf.len() + data.len(),
            None => return Err(no_leading_frame()),
        };
        if let Err(e) = self.check_limit(len) {
            self.partial = None;
            return Err(e);
        }
        if let Some((_, buf)) = self.partial.as_mut() {
            buf.extend_from_slice(data);
        }
        Ok(())
    }

    fn check_limit(&self, len: usize) -> Result<(), WsError> {
        match self.read_limit {
            Some(limit) if len > limit => Err(WsError::ReadLimit),
            _ => Ok(()),
        }
    }

    fn closed(&mut self, reason: Option<CloseReason>) -> WsError {
        let (code, reason) = match reason {
            Some(r) => (u16::from(r.code), r.description.unwrap_or_default()),
            None => (close_code::NO_STATUS_RECEIVED, String::new()),
        };

        if !self.close_sent.swap(true, Ordering::AcqRel) {
            // 1005 must not appear on the wire
            let echo = (code != close_code::NO_STATUS_RECEIVED)
                .then(|| CloseReason::from(CloseCode::from(code)));
            let _ = self.outbound.send(Message::Close(echo));
        }

        WsError::Closed { code, reason }
    }
}

fn no_leading_frame() -> WsError {
    WsError::Protocol("continuation frame without a leading frame".to_string())
}

/// Writing side of a [`Socket`]. Cloning yields another handle to the same
/// connection.
#[derive(Debug, Clone)]
pub struct WriteHalf {
    outbound: mpsc::UnboundedSender<Message>,
    close_sent: Arc<AtomicBool>,
    write_buffer_size: usize,
}

impl WriteHalf {
    /// Queues a message for the peer. Never waits: the outbound queue is
    /// unbounded and drained by the connection's actor.
    pub fn write_message(&self, kind: MessageType, data: impl Into<Bytes>) -> Result<(), WsError> {
        if self.close_sent.load(Ordering::Acquire) {
            return Err(WsError::CloseSent);
        }
        let data = data.into();

        match kind {
            MessageType::Text => {
                let text = std::str::from_utf8(&data).map_err(|_| WsError::InvalidUtf8)?;
                if self.fragments(data.len()) {
                    self.write_fragmented(kind, data)
                } else {
                    self.send(Message::Text(text.to_owned().into()))
                }
            }
            MessageType::Binary => {
                if self.fragments(data.len()) {
                    self.write_fragmented(kind, data)
                } else {
                    self.send(Message::Binary(data))
                }
            }
            MessageType::Close => {
                let reason = parse_close_payload(&data)?;
                self.close_sent.store(true, Ordering::Release);
                self.send(Message::Close(reason))
            }
            MessageType::Ping => self.send(Message::Ping(data)),
            MessageType::Pong => self.send(Message::Pong(data)),
        }
    }

    pub fn write_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.write_message(MessageType::Text, Bytes::from(text.into()))
    }

    pub fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        self.write_message(MessageType::Close, format_close_message(code, reason))
    }

    fn fragments(&self, len: usize) -> bool {
        self.write_buffer_size > 0 && len > self.write_buffer_size
    }

    fn write_fragmented(&self, kind: MessageType, data: Bytes) -> Result<(), WsError> {
        let size = self.write_buffer_size;
        let total = data.len();
        let mut offset = 0;

        while offset < total {
            let end = usize::min(offset + size, total);
            let chunk = data.slice(offset..end);
            let item = if offset == 0 {
                match kind {
                    MessageType::Text => Item::FirstText(chunk),
                    _ => Item::FirstBinary(chunk),
                }
            } else if end == total {
                Item::Last(chunk)
            } else {
                Item::Continue(chunk)
            };
            self.send(Message::Continuation(item))?;
            offset = end;
        }

        Ok(())
    }

    fn send(&self, message: Message) -> Result<(), WsError> {
        self.outbound
            .send(message)
            .map_err(|_| WsError::ConnectionClosed)
    }
}

/// Formats a close message payload for [`MessageType::Close`]: the status
/// code in network byte order followed by the reason text. `1005` yields an
/// empty payload since that code may not be sent.
pub fn format_close_message(code: u16, text: &str) -> Bytes {
    if code == close_code::NO_STATUS_RECEIVED {
        return Bytes::new();
    }
    let mut buf = BytesMut::with_capacity(2 + text.len());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
    buf.freeze()
}

fn parse_close_payload(data: &[u8]) -> Result<Option<CloseReason>, WsError> {
    match data.len() {
        0 => Ok(None),
        1 => Err(WsError::InvalidClosePayload),
        _ => {
            let code = u16::from_be_bytes([data[0], data[1]]);
            let description = std::str::from_utf8(&data[2..])
                .map_err(|_| WsError::InvalidClosePayload)?;
            Ok(Some(CloseReason {
                code: CloseCode::from(code),
                description: (!description.is_empty()).then(|| description.to_string()),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SocketOptions {
        SocketOptions::default()
    }

    #[tokio::test]
    async fn test_read_text_and_binary() {
        let (mut socket, tx, _rx) = pair(options());
        tx.send(Ok(Message::Text("hello".into()))).unwrap();
        tx.send(Ok(Message::Binary(Bytes::from_static(b"\x01\x02")))).unwrap();

        let (kind, data) = socket.read_message().await.unwrap();
        assert_eq!(kind, MessageType::Text);
        assert_eq!(&data[..], b"hello");

        let (kind, data) = socket.read_message().await.unwrap();
        assert_eq!(kind, MessageType::Binary);
        assert_eq!(&data[..], b"\x01\x02");
    }

    #[tokio::test]
    async fn test_reassembles_continuation_frames() {
        let (mut socket, tx, _rx) = pair(options());
        tx.send(Ok(Message::Continuation(Item::FirstText(Bytes::from_static(b"ab"))))).unwrap();
        tx.send(Ok(Message::Continuation(Item::Continue(Bytes::from_static(b"cd"))))).unwrap();
        tx.send(Ok(Message::Continuation(Item::Last(Bytes::from_static(b"ef"))))).unwrap();

        let (kind, data) = socket.read_message().await.unwrap();
        assert_eq!(kind, MessageType::Text);
        assert_eq!(&data[..], b"abcdef");
    }

    #[tokio::test]
    async fn test_continuation_without_leading_frame() {
        let (mut socket, tx, _rx) = pair(options());
        tx.send(Ok(Message::Continuation(Item::Last(Bytes::from_static(b"x"))))).unwrap();

        assert!(matches!(socket.read_message().await, Err(WsError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_limit() {
        let (mut socket, tx, _rx) = pair(SocketOptions { read_limit: Some(4), write_buffer_size: 0 });
        tx.send(Ok(Message::Binary(Bytes::from_static(b"12345")))).unwrap();
        tx.send(Ok(Message::Continuation(Item::FirstBinary(Bytes::from_static(b"123"))))).unwrap();
        tx.send(Ok(Message::Continuation(Item::Last(Bytes::from_static(b"45"))))).unwrap();
        tx.send(Err(ProtocolError::Overflow)).unwrap();

        assert!(matches!(socket.read_message().await, Err(WsError::ReadLimit)));
        assert!(matches!(socket.read_message().await, Err(WsError::ReadLimit)));
        assert!(matches!(socket.read_message().await, Err(WsError::ReadLimit)));
    }

    #[tokio::test]
    async fn test_ping_is_answered_while_reading() {
        let (mut socket, tx, mut rx) = pair(options());
        tx.send(Ok(Message::Ping(Bytes::from_static(b"p")))).unwrap();
        tx.send(Ok(Message::Text("after".into()))).unwrap();

        let (_, data) = socket.read_message().await.unwrap();
        assert_eq!(&data[..], b"after");
        match rx.try_recv() {
            Ok(Message::Pong(data)) => assert_eq!(&data[..], b"p"),
            other => panic!("expected pong, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_close_is_echoed_once() {
        let (mut socket, tx, mut rx) = pair(options());
        tx.send(Ok(Message::Close(Some(CloseCode::Away.into())))).unwrap();

        match socket.read_message().await {
            Err(WsError::Closed { code, .. }) => assert_eq!(code, close_code::GOING_AWAY),
            other => panic!("expected close, got {:?}", other),
        }
        match rx.try_recv() {
            Ok(Message::Close(Some(reason))) => assert_eq!(u16::from(reason.code), 1001),
            other => panic!("expected close echo, got {:?}", other),
        }
        assert!(matches!(
            socket.write_message(MessageType::Text, "late"),
            Err(WsError::CloseSent)
        ));
    }

    #[tokio::test]
    async fn test_dropped_bridge_closes_reader() {
        let (mut socket, tx, _rx) = pair(options());
        drop(tx);
        assert!(matches!(socket.read_message().await, Err(WsError::ConnectionClosed)));
    }

    #[test]
    fn test_write_fragments_large_messages() {
        let (socket, _tx, mut rx) = pair(SocketOptions { read_limit: None, write_buffer_size: 4 });
        socket.write_message(MessageType::Binary, Bytes::from_static(b"0123456789")).unwrap();

        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            frames.push(message);
        }
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], Message::Continuation(Item::FirstBinary(b)) if &b[..] == b"0123"));
        assert!(matches!(&frames[1], Message::Continuation(Item::Continue(b)) if &b[..] == b"4567"));
        assert!(matches!(&frames[2], Message::Continuation(Item::Last(b)) if &b[..] == b"89"));
    }

    #[test]
    fn test_write_rejects_invalid_text() {
        let (socket, _tx, _rx) = pair(options());
        assert!(matches!(
            socket.write_message(MessageType::Text, vec![0xff, 0xfe]),
            Err(WsError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_close_then_write() {
        let (socket, _tx, mut rx) = pair(options());
        socket.close(close_code::NORMAL_CLOSURE, "done").unwrap();

        match rx.try_recv() {
            Ok(Message::Close(Some(reason))) => {
                assert_eq!(u16::from(reason.code), 1000);
                assert_eq!(reason.description.as_deref(), Some("done"));
            }
            other => panic!("expected close, got {:?}", other),
        }
        assert!(matches!(socket.write_text("again"), Err(WsError::CloseSent)));
    }

    #[test]
    fn test_format_close_message() {
        assert_eq!(&format_close_message(1000, "ok")[..], b"\x03\xe8ok");
        assert!(format_close_message(close_code::NO_STATUS_RECEIVED, "ignored").is_empty());
        assert!(matches!(parse_close_payload(b"\x03"), Err(WsError::InvalidClosePayload)));
    }
}
