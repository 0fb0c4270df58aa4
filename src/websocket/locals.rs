//! Request-scoped values ("locals") that survive the websocket upgrade.
//!
//! Middleware stores values on the request with [`LocalsExt::set_local`];
//! the upgrade adapter copies them into the connection wrapper before the
//! handler runs.

use std::collections::HashMap;

use actix_web::HttpMessage;
use serde::Serialize;

/// A value attached to a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Local {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Local {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Local::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Local::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Local::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Local {
    fn from(value: &str) -> Self {
        Local::Str(value.to_string())
    }
}

impl From<String> for Local {
    fn from(value: String) -> Self {
        Local::Str(value)
    }
}

impl From<i64> for Local {
    fn from(value: i64) -> Self {
        Local::Int(value)
    }
}

impl From<i32> for Local {
    fn from(value: i32) -> Self {
        Local::Int(value.into())
    }
}

impl From<f64> for Local {
    fn from(value: f64) -> Self {
        Local::Float(value)
    }
}

impl From<bool> for Local {
    fn from(value: bool) -> Self {
        Local::Bool(value)
    }
}

impl From<Vec<u8>> for Local {
    fn from(value: Vec<u8>) -> Self {
        Local::Bytes(value)
    }
}

impl From<serde_json::Value> for Local {
    fn from(value: serde_json::Value) -> Self {
        Local::Json(value)
    }
}

/// String-keyed registry of [`Local`] values kept in request extensions.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    values: HashMap<String, Local>,
}

impl Locals {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Local>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Local> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Local)> {
        self.values.iter()
    }
}

/// Access to [`Locals`] on anything carrying request extensions
/// (`HttpRequest`, `ServiceRequest`).
pub trait LocalsExt {
    fn set_local(&self, key: impl Into<String>, value: impl Into<Local>);

    fn local(&self, key: &str) -> Option<Local>;
}

impl<T: HttpMessage> LocalsExt for T {
    fn set_local(&self, key: impl Into<String>, value: impl Into<Local>) {
        let mut extensions = self.extensions_mut();
        match extensions.get_mut::<Locals>() {
            Some(locals) => locals.insert(key, value),
            None => {
                let mut locals = Locals::default();
                locals.insert(key, value);
                extensions.insert(locals);
            }
        }
    }

    fn local(&self, key: &str) -> Option<Local> {
        self.extensions()
            .get::<Locals>()
            .and_then(|locals| locals.get(key).cloned())
    }
}
