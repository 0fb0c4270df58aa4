use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::connection::Conn;

/// Reuse pool for [`Conn`] wrappers.
///
/// Owned by an [`Upgrader`](super::Upgrader) or injected by the caller so
/// several upgraders can share one. Safe for concurrent acquire/release.
#[derive(Debug, Default)]
pub struct ConnPool {
    idle: Mutex<Vec<Conn>>,
    max_idle: Option<usize>,
    created: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Wrappers allocated over the pool's lifetime.
    pub created: usize,
    /// Wrappers waiting for reuse.
    pub idle: usize,
    /// Wrappers currently handed out.
    pub in_use: usize,
}

impl ConnPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool that keeps at most `max_idle` released wrappers; extra ones are
    /// dropped on release.
    pub fn bounded(max_idle: usize) -> Self {
        Self {
            max_idle: Some(max_idle),
            ..Self::default()
        }
    }

    /// Takes an idle wrapper, or allocates one, with all mappings emptied.
    pub fn acquire(self: &Arc<Self>) -> PooledConn {
        let recycled = self.idle.lock().pop();
        let conn = match recycled {
            Some(mut conn) => {
                conn.reset();
                conn
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Conn::new()
            }
        };
        self.acquired.fetch_add(1, Ordering::AcqRel);

        PooledConn {
            conn: Some(conn),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut conn: Conn) {
        let id = conn.id();
        drop(conn.detach());

        let mut idle = self.idle.lock();
        match self.max_idle {
            Some(max) if idle.len() >= max => {
                debug!("Pool full, dropping connection wrapper {}", id);
            }
            _ => idle.push(conn),
        }
        drop(idle);

        self.released.fetch_add(1, Ordering::AcqRel);
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let released = self.released.load(Ordering::Acquire);
        let acquired = self.acquired.load(Ordering::Acquire);
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            idle,
            in_use: acquired.saturating_sub(released),
        }
    }
}

/// A [`Conn`] on loan from a [`ConnPool`]. Dropping it clears the socket and
/// returns the wrapper to the pool, whichever way the handler exits.
#[derive(Debug)]
pub struct PooledConn {
    conn: Option<Conn>,
    pool: Arc<ConnPool>,
}

impl Deref for PooledConn {
    type Target = Conn;

    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
