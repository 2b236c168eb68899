//! Session store — immutable snapshots of recent sessions for status queries.
//!
//! The executor task owning a session publishes a clone after every change;
//! readers only ever see those clones. Over capacity the oldest finished
//! session is dropped, or the oldest overall if none has finished.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::models::ExecutionSession;

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, ExecutionSession>,
    order: VecDeque<String>,
}

pub struct SessionStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Insert or replace the snapshot for `session.session_id`.
    pub fn publish(&self, session: &ExecutionSession) {
        let mut inner = self.lock();
        let id = session.session_id.clone();
        if inner.by_id.insert(id.clone(), session.clone()).is_none() {
            inner.order.push_back(id);
        }

        while inner.by_id.len() > self.capacity {
            let victim = inner
                .order
                .iter()
                .position(|id| {
                    inner
                        .by_id
                        .get(id)
                        .map(|s| s.is_finished())
                        .unwrap_or(true)
                })
                .unwrap_or(0);
            match inner.order.remove(victim) {
                Some(id) => {
                    inner.by_id.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<ExecutionSession> {
        self.lock().by_id.get(session_id).cloned()
    }

    /// Snapshots oldest first.
    pub fn list(&self) -> Vec<ExecutionSession> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
