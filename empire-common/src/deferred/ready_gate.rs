//! Readiness tracking with edge-triggered notification

use tokio::sync::watch;

/// Result of a `ReadyGate::set_ready` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// not-ready → ready; the caller should drain
    BecameReady,
    /// ready → not-ready
    BecameNotReady,
    /// Value unchanged; nothing published
    Unchanged,
}

/// Boolean readiness flag
///
/// Observers receive one notification per edge; repeated writes of the same
/// value are invisible to them.
pub struct ReadyGate {
    tx: watch::Sender<bool>,
}

impl ReadyGate {
    pub fn new(initially_ready: bool) -> Self {
        let (tx, _) = watch::channel(initially_ready);
        Self { tx }
    }

    /// Store the new readiness and report which edge (if any) was crossed
    pub fn set_ready(&self, ready: bool) -> Transition {
        let changed = self.tx.send_if_modified(|current| {
            if *current == ready {
                false
            } else {
                *current = ready;
                true
            }
        });

        match (changed, ready) {
            (false, _) => Transition::Unchanged,
            (true, true) => Transition::BecameReady,
            (true, false) => Transition::BecameNotReady,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that wakes on every edge
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges() {
        let gate = ReadyGate::new(false);
        assert!(!gate.is_ready());

        assert_eq!(gate.set_ready(true), Transition::BecameReady);
        assert!(gate.is_ready());

        assert_eq!(gate.set_ready(true), Transition::Unchanged);
        assert_eq!(gate.set_ready(false), Transition::BecameNotReady);
        assert_eq!(gate.set_ready(false), Transition::Unchanged);
        assert!(!gate.is_ready());
    }

    #[tokio::test]
    async fn test_subscriber_sees_edges_only() {
        let gate = ReadyGate::new(false);
        let mut rx = gate.subscribe();

        gate.set_ready(true);
        rx.changed().await.expect("sender alive");
        assert!(*rx.borrow_and_update());

        // Same value again: no notification
        gate.set_ready(true);
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
