use std::fmt;
use std::future::Future;
use std::sync::Arc;

use actix_web::http::header::{self, HeaderMap};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::future::{ready, Ready};
use tracing::{debug, info, warn};

use crate::error::WsError;
use super::bridge::Bridge;
use super::pool::{ConnPool, PooledConn};
use super::socket::{self, SocketOptions};

/// Largest frame accepted by the actix codec unless configured otherwise.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

pub type Filter = Arc<dyn Fn(&HttpRequest) -> bool + Send + Sync>;

/// Upgrade configuration, read once when the [`Upgrader`] is built.
#[derive(Clone)]
pub struct Config {
    /// Decides per request whether an upgrade is attempted at all.
    /// Rejected requests get `403 Forbidden`.
    pub filter: Option<Filter>,
    /// Accepted subprotocols in server preference order.
    pub subprotocols: Vec<String>,
    /// Accepted `Origin` header values. Empty, or containing `"*"`, allows
    /// every origin.
    pub origins: Vec<String>,
    /// Maximum size of a single inbound frame.
    pub read_buffer_size: usize,
    /// Outbound fragmentation threshold, zero sends every message whole.
    pub write_buffer_size: usize,
    /// Maximum size of a reassembled inbound message.
    pub read_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: None,
            subprotocols: Vec::new(),
            origins: vec!["*".to_string()],
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: 0,
            read_limit: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("subprotocols", &self.subprotocols)
            .field("origins", &self.origins)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("read_limit", &self.read_limit)
            .finish()
    }
}

impl Config {
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&HttpRequest) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit);
        self
    }

    /// Fills in defaults the builder leaves open: no origins means every
    /// origin.
    pub(crate) fn resolve(mut self) -> Self {
        if self.origins.is_empty() {
            self.origins = vec!["*".to_string()];
        }
        self
    }

    fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            read_limit: self.read_limit,
            write_buffer_size: self.write_buffer_size,
        }
    }

    fn origin_allowed(&self, headers: &HeaderMap) -> Result<(), WsError> {
        if self.origins.is_empty() || self.origins.iter().any(|o| o == "*") {
            return Ok(());
        }
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if self.origins.iter().any(|o| o == origin) {
            Ok(())
        } else {
            Err(WsError::OriginNotAllowed(origin.to_string()))
        }
    }
}

struct Inner<F> {
    handler: F,
    config: Config,
    pool: Arc<ConnPool>,
}

/// Upgrades requests to websocket connections and runs `handler` on each.
///
/// ```ignore
/// let upgrader = Upgrader::new(handlers::echo, None);
/// HttpServer::new(move || {
///     App::new().route("/ws", web::get().to(upgrader.clone().into_service()))
/// })
/// ```
pub struct Upgrader<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for Upgrader<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, Fut> Upgrader<F>
where
    F: Fn(PooledConn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + 'static,
{
    /// Builds an upgrader with its own wrapper pool.
    pub fn new(handler: F, config: Option<Config>) -> Self {
        Self::with_pool(handler, config, Arc::new(ConnPool::new()))
    }

    /// Builds an upgrader drawing wrappers from `pool`.
    pub fn with_pool(handler: F, config: Option<Config>, pool: Arc<ConnPool>) -> Self {
        let config = config.unwrap_or_default().resolve();
        debug!("WebSocket upgrader configured: {:?}", config);
        Self {
            inner: Arc::new(Inner { handler, config, pool }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn pool(&self) -> &Arc<ConnPool> {
        &self.inner.pool
    }

    /// Performs the upgrade for one request.
    ///
    /// On success the handler is spawned on the current worker and the
    /// `101 Switching Protocols` response is returned. Every failure is an
    /// error response; the handler is not run and the wrapper goes back to
    /// the pool.
    pub fn upgrade(&self, req: &HttpRequest, payload: web::Payload) -> Result<HttpResponse, WsError> {
        let inner = &self.inner;

        if let Some(filter) = &inner.config.filter {
            if !filter(req) {
                debug!("WebSocket upgrade for {} rejected by filter", req.path());
                return Err(WsError::Filtered);
            }
        }

        let mut conn = inner.pool.acquire();
        conn.populate(req);

        if let Err(e) = inner.config.origin_allowed(req.headers()) {
            warn!("Rejecting WebSocket upgrade for {}: {}", req.path(), e);
            return Err(e);
        }

        let protocols: Vec<&str> = inner.config.subprotocols.iter().map(String::as_str).collect();
        if let Err(e) = ws::handshake_with_protocols(req, &protocols) {
            debug!("Bad WebSocket handshake for {}: {}", req.path(), e);
            return Err(e.into());
        }

        let (socket, inbound, outbound) = socket::pair(inner.config.socket_options());
        let bridge = Bridge::new(conn.id(), inbound, outbound);
        let response = ws::WsResponseBuilder::new(bridge, req, payload)
            .protocols(&protocols)
            .frame_size(inner.config.read_buffer_size)
            .start()
            .map_err(|e| WsError::UpgradeFailed(e.to_string()))?;

        let subprotocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        conn.attach(socket, subprotocol);

        info!("WebSocket connection {} upgraded on {}", conn.id(), req.path());

        let handler_inner = Arc::clone(inner);
        actix_rt::spawn(async move {
            let id = conn.id();
            (handler_inner.handler)(conn).await;
            debug!("WebSocket handler for connection {} returned", id);
        });

        Ok(response)
    }

    /// Turns the upgrader into an actix-web handler for `web::get().to(..)`.
    pub fn into_service(
        self,
    ) -> impl Fn(HttpRequest, web::Payload) -> Ready<Result<HttpResponse, WsError>> + Clone + 'static
    {
        move |req: HttpRequest, payload: web::Payload| ready(self.upgrade(&req, payload))
    }
}

/// Shorthand for `Upgrader::new(handler, config).into_service()`.
pub fn handler<F, Fut>(
    handler: F,
    config: Option<Config>,
) -> impl Fn(HttpRequest, web::Payload) -> Ready<Result<HttpResponse, WsError>> + Clone + 'static
where
    F: Fn(PooledConn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + 'static,
{
    Upgrader::new(handler, config).into_service()
}

/// Reports whether the request asks to be upgraded to the websocket protocol.
pub fn is_websocket_upgrade(req: &HttpRequest) -> bool {
    let headers = req.headers();
    header_has_token(headers, header::CONNECTION, "upgrade")
        && header_has_token(headers, header::UPGRADE, "websocket")
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}
