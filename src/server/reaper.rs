//! Idle connection reaper.
//!
//! Every live connection has an entry keyed by its [`ConnId`]. The reactor
//! calls [`IdleReaper::tick`] once per tick; any connection idle for more than
//! `timeout` ticks has its close signal fired. The connection task notices the
//! signal, drops its socket, and its [`Registration`] removes the entry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct IdleEntry {
    idle: u64,
    /// Taken when the close signal fires, so it fires at most once.
    close: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub struct IdleReaper {
    timeout: u64,
    next_id: u64,
    entries: HashMap<ConnId, IdleEntry>,
}

impl IdleReaper {
    /// `timeout` is in ticks.
    pub fn new(timeout: u64) -> Self {
        Self {
            timeout,
            next_id: 0,
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self) -> (ConnId, oneshot::Receiver<()>) {
        let id = ConnId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            IdleEntry {
                idle: 0,
                close: Some(tx),
            },
        );
        (id, rx)
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&mut self, id: ConnId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Resets the idle counter after socket activity.
    pub fn touch(&mut self, id: ConnId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.idle = 0;
        }
    }

    /// Advances every idle counter by one tick and closes expired connections.
    ///
    /// Returns the number of connections closed by this tick.
    pub fn tick(&mut self) -> usize {
        let mut closed = 0;
        for (id, entry) in self.entries.iter_mut() {
            entry.idle += 1;
            if entry.idle > self.timeout {
                if let Some(close) = entry.close.take() {
                    debug!(conn = %id, idle = entry.idle, "reaping idle connection");
                    let _ = close.send(());
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Fires every outstanding close signal.
    pub fn close_all(&mut self) -> usize {
        self.entries
            .values_mut()
            .filter_map(|entry| entry.close.take())
            .map(|close| {
                let _ = close.send(());
            })
            .count()
    }

    pub fn idle_ticks(&self, id: ConnId) -> Option<u64> {
        self.entries.get(&id).map(|e| e.idle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A connection's membership in the reaper, removed on drop.
pub struct Registration {
    id: ConnId,
    reaper: Rc<RefCell<IdleReaper>>,
}

impl Registration {
    pub fn new(reaper: &Rc<RefCell<IdleReaper>>) -> (Self, oneshot::Receiver<()>) {
        let (id, close) = reaper.borrow_mut().register();
        let registration = Self {
            id,
            reaper: Rc::clone(reaper),
        };
        (registration, close)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn touch(&self) {
        self.reaper.borrow_mut().touch(self.id);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.reaper.borrow_mut().unregister(self.id);
    }
}
