//! FIFO buffer of pending work items

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::WorkItem;
use crate::{Error, Result};

/// Ordered queue of pending work with atomic drain
///
/// Insertion order is processing order. The lock is never held across an
/// await point, so a `std::sync::Mutex` is sufficient.
pub struct RetryQueue<T> {
    items: Mutex<VecDeque<WorkItem<T>>>,
    capacity: Option<usize>,
}

impl<T> RetryQueue<T> {
    /// Create a queue; `None` means unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WorkItem<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail, returning the queue length afterwards
    ///
    /// Fails with `QueueFull` when the configured capacity is reached;
    /// items already queued are untouched.
    pub fn enqueue(&self, item: WorkItem<T>) -> Result<usize> {
        self.try_enqueue(item).map_err(|_| Error::QueueFull {
            capacity: self.capacity.unwrap_or(usize::MAX),
        })
    }

    /// Like `enqueue`, but hands the item back on rejection
    pub(crate) fn try_enqueue(&self, item: WorkItem<T>) -> std::result::Result<usize, WorkItem<T>> {
        let mut items = self.lock();
        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                return Err(item);
            }
        }
        items.push_back(item);
        Ok(items.len())
    }

    /// Remove and return every queued item, leaving the queue empty
    ///
    /// Items enqueued after this returns belong to the next batch.
    pub fn drain_all(&self) -> Vec<WorkItem<T>> {
        self.lock().drain(..).collect()
    }

    /// Put undispatched items back at the head, keeping their order
    ///
    /// Used when a drain pass stops early. Capacity is not enforced here
    /// since these items were already admitted.
    pub fn restore(&self, batch: Vec<WorkItem<T>>) {
        let mut items = self.lock();
        for item in batch.into_iter().rev() {
            items.push_front(item);
        }
    }

    /// Remove a still-queued item by identity
    pub fn cancel(&self, id: Uuid) -> Option<WorkItem<T>> {
        let mut items = self.lock();
        let position = items.iter().position(|item| item.id == id)?;
        items.remove(position)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Ids of queued items, head first
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.lock().iter().map(|item| item.id).collect()
    }
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self::new(None)
    }
}
