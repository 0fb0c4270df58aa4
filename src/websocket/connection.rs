use std::collections::HashMap;

use actix_web::web::Bytes;
use actix_web::{HttpMessage, HttpRequest};
use tracing::warn;
use uuid::Uuid;

use crate::error::WsError;
use super::constants::MessageType;
use super::locals::{Local, Locals};
use super::socket::{ReadHalf, Socket, WriteHalf};

/// Connection wrapper handed to websocket handlers.
///
/// Carries the request's locals, query parameters, path parameters and
/// cookies as they were at upgrade time, next to the established socket.
/// Instances are recycled through a [`ConnPool`](super::ConnPool).
#[derive(Debug)]
pub struct Conn {
    id: Uuid,
    socket: Option<Socket>,
    locals: HashMap<String, Local>,
    params: HashMap<String, String>,
    cookies: HashMap<String, String>,
    queries: HashMap<String, String>,
    subprotocol: Option<String>,
}

impl Conn {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            socket: None,
            locals: HashMap::new(),
            params: HashMap::new(),
            cookies: HashMap::new(),
            queries: HashMap::new(),
            subprotocol: None,
        }
    }

    /// Prepares a recycled instance for a new request.
    pub(crate) fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.socket = None;
        self.locals.clear();
        self.params.clear();
        self.cookies.clear();
        self.queries.clear();
        self.subprotocol = None;
    }

    /// Copies the request's scoped state into the wrapper.
    pub(crate) fn populate(&mut self, req: &HttpRequest) {
        if let Some(locals) = req.extensions().get::<Locals>() {
            for (key, value) in locals.iter() {
                self.locals.insert(key.clone(), value.clone());
            }
        }

        for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
            self.queries.insert(key.into_owned(), value.into_owned());
        }

        for (key, value) in req.match_info().iter() {
            self.params.insert(key.to_string(), value.to_string());
        }

        match req.cookies() {
            Ok(cookies) => {
                for cookie in cookies.iter() {
                    self.cookies.insert(cookie.name().to_string(), cookie.value().to_string());
                }
            }
            Err(e) => warn!("Ignoring unparsable cookies on connection {}: {}", self.id, e),
        }
    }

    pub(crate) fn attach(&mut self, socket: Socket, subprotocol: Option<String>) {
        self.socket = Some(socket);
        self.subprotocol = subprotocol;
    }

    pub(crate) fn detach(&mut self) -> Option<Socket> {
        self.socket.take()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.socket.is_some()
    }

    /// Subprotocol negotiated during the handshake, if any.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    pub fn locals(&self, key: &str) -> Option<&Local> {
        self.locals.get(key)
    }

    /// Query parameter `key`, or an empty string.
    pub fn query(&self, key: &str) -> &str {
        self.query_or(key, "")
    }

    pub fn query_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.queries.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Path parameter `key`, or an empty string.
    pub fn params(&self, key: &str) -> &str {
        self.param_or(key, "")
    }

    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Cookie value for `key`, or an empty string.
    pub fn cookies(&self, key: &str) -> &str {
        self.cookie_or(key, "")
    }

    pub fn cookie_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.cookies.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn socket(&self) -> Result<&Socket, WsError> {
        self.socket.as_ref().ok_or(WsError::NotAttached)
    }

    pub fn socket_mut(&mut self) -> Result<&mut Socket, WsError> {
        self.socket.as_mut().ok_or(WsError::NotAttached)
    }

    pub async fn read_message(&mut self) -> Result<(MessageType, Bytes), WsError> {
        self.socket_mut()?.read_message().await
    }

    pub fn write_message(&self, kind: MessageType, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.socket()?.write_message(kind, data)
    }

    pub fn write_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.socket()?.write_text(text)
    }

    pub fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        self.socket()?.close(code, reason)
    }

    /// Moves the socket out as independent read and write halves. The
    /// wrapper stays usable for locals, queries, params and cookies.
    pub fn split(&mut self) -> Result<(ReadHalf, WriteHalf), WsError> {
        self.detach().map(Socket::split).ok_or(WsError::NotAttached)
    }
}
