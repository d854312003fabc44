//! Terminal storage for items that exhausted their retry budget

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::WorkItem;

/// A work item that will never be dispatched again
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter<T> {
    pub item: WorkItem<T>,
    /// Last failure message
    pub reason: String,
    pub dead_at: DateTime<Utc>,
}

/// Append-only collection of dead letters
pub struct DeadLetterBox<T> {
    letters: Mutex<Vec<DeadLetter<T>>>,
}

impl<T> DeadLetterBox<T> {
    pub fn new() -> Self {
        Self {
            letters: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeadLetter<T>>> {
        self.letters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: WorkItem<T>, reason: String) {
        self.lock().push(DeadLetter {
            item,
            reason,
            dead_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return all dead letters (e.g. for manual replay)
    pub fn take_all(&self) -> Vec<DeadLetter<T>> {
        std::mem::take(&mut *self.lock())
    }
}

impl<T: Clone> DeadLetterBox<T> {
    pub fn snapshot(&self) -> Vec<DeadLetter<T>> {
        self.lock().clone()
    }
}

impl<T> Default for DeadLetterBox<T> {
    fn default() -> Self {
        Self::new()
    }
}
