use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_http::ws::{CloseCode, Message, ProtocolError};
use actix_web_actors::ws::WebsocketContext;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::socket::Inbound;

/// Actor owning the actix websocket context of one connection.
///
/// It forwards every decoded frame to the handler's [`Socket`](super::Socket)
/// and writes whatever the socket queues. Once every outbound sender is gone
/// the connection is closed with a normal close frame.
pub(crate) struct Bridge {
    id: Uuid,
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: Option<mpsc::UnboundedReceiver<Message>>,
    close_sent: bool,
}

impl Bridge {
    pub(crate) fn new(
        id: Uuid,
        inbound: mpsc::UnboundedSender<Inbound>,
        outbound: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            id,
            inbound,
            outbound: Some(outbound),
            close_sent: false,
        }
    }

    fn close(&mut self, code: CloseCode, ctx: &mut WebsocketContext<Self>) {
        if !self.close_sent {
            self.close_sent = true;
            ctx.close(Some(code.into()));
        }
        ctx.stop();
    }
}

impl Actor for Bridge {
    type Context = WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("WebSocket connection {} established", self.id);

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(futures::stream::unfold(outbound, |mut rx| async move {
                rx.recv().await.map(|message| (message, rx))
            }));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!("WebSocket connection {} stopped", self.id);
    }
}

/// Frames from the peer.
impl StreamHandler<Result<Message, ProtocolError>> for Bridge {
    fn handle(&mut self, msg: Result<Message, ProtocolError>, ctx: &mut Self::Context) {
        let code = match &msg {
            Ok(_) => None,
            Err(ProtocolError::Overflow) => Some(CloseCode::Size),
            Err(_) => Some(CloseCode::Protocol),
        };
        if let Err(e) = &msg {
            warn!("Protocol error on connection {}: {}", self.id, e);
        }

        // the handler may have dropped its reader and only write
        let _ = self.inbound.send(msg);

        if let Some(code) = code {
            self.close(code, ctx);
        }
    }
}

/// Frames queued by the handler.
impl StreamHandler<Message> for Bridge {
    fn handle(&mut self, msg: Message, ctx: &mut Self::Context) {
        match msg {
            Message::Close(reason) => {
                self.close_sent = true;
                ctx.close(reason);
                ctx.stop();
            }
            other => ctx.write_raw(other),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Handler for connection {} released its socket", self.id);
        self.close(CloseCode::Normal, ctx);
    }
}
