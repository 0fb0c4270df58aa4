//! Example websocket handlers.

use actix_web::web::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::websocket::{Local, MessageType, PooledConn};

/// Writes every message back with the same type until a read or write fails.
pub async fn echo(mut conn: PooledConn) {
    let id = conn.id();
    if let Some(peer) = conn.locals("peer").and_then(Local::as_str) {
        debug!("echo on {} for {}", id, peer);
    }
    loop {
        let (kind, msg) = match conn.read_message().await {
            Ok(message) => message,
            Err(e) => {
                info!("read on {}: {}", id, e);
                break;
            }
        };
        debug!("recv on {}: {} message of {} bytes", id, kind, msg.len());

        if let Err(e) = conn.write_message(kind, msg) {
            error!("write on {}: {}", id, e);
            break;
        }
    }
}

/// Echo with reading and writing in separate tasks joined by an unbounded
/// queue. Payloads are written back as binary messages, in arrival order.
pub async fn async_echo(mut conn: PooledConn) {
    let id = conn.id();
    let (mut reader, writer) = match conn.split() {
        Ok(halves) => halves,
        Err(e) => {
            error!("split on {}: {}", id, e);
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    actix_rt::spawn(async move {
        loop {
            match reader.read_message().await {
                Ok((kind, msg)) => {
                    debug!("recv on {}: {} message of {} bytes", id, kind, msg.len());
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    info!("read on {}: {}", id, e);
                    break;
                }
            }
        }
    });

    while let Some(data) = rx.recv().await {
        if let Err(e) = writer.write_message(MessageType::Binary, data) {
            error!("write on {}: {}", id, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::socket::{pair, SocketOptions};
    use crate::websocket::ConnPool;
    use actix_http::ws::Message;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_echo_keeps_message_type() {
        let pool = Arc::new(ConnPool::new());
        let mut conn = pool.acquire();
        let (socket, tx, mut rx) = pair(SocketOptions::default());
        conn.attach(socket, None);

        tx.send(Ok(Message::Text("hi".into()))).unwrap();
        tx.send(Ok(Message::Binary(Bytes::from_static(b"\x00\x01")))).unwrap();
        drop(tx);
        echo(conn).await;

        assert!(matches!(rx.recv().await, Some(Message::Text(t)) if &*t == "hi"));
        assert!(matches!(rx.recv().await, Some(Message::Binary(b)) if &b[..] == b"\x00\x01"));
        assert!(rx.recv().await.is_none());
        assert_eq!(pool.stats().in_use, 0);
    }

    #[actix_web::test]
    async fn test_async_echo_preserves_order() {
        let pool = Arc::new(ConnPool::new());
        let mut conn = pool.acquire();
        let (socket, tx, mut rx) = pair(SocketOptions::default());
        conn.attach(socket, None);

        for payload in ["m1", "m2", "m3"] {
            tx.send(Ok(Message::Text(payload.into()))).unwrap();
        }
        drop(tx);
        async_echo(conn).await;

        for expected in ["m1", "m2", "m3"] {
            match rx.recv().await {
                Some(Message::Binary(b)) => assert_eq!(&b[..], expected.as_bytes()),
                other => panic!("expected binary echo, got {:?}", other),
            }
        }
    }

    #[actix_web::test]
    async fn test_echo_returns_without_socket() {
        let pool = Arc::new(ConnPool::new());
        echo(pool.acquire()).await;
        async_echo(pool.acquire()).await;
        assert_eq!(pool.stats().in_use, 0);
    }
}
