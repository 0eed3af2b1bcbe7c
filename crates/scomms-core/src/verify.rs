//! Suspended confirmations for first-contact peers.
//!
//! A dialing session that hits an unknown peer parks here until the
//! operator answers the confirmation dialog. Each fingerprint holds at
//! most one waiter; a second registration for the same peer is a protocol
//! violation that is reported, never a crash. Dropping a waiter cancels
//! the parked session, which then closes its connection.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{CoreError, Result};

#[derive(Default)]
pub struct VerifyWaiters {
    inner: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl VerifyWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `fingerprint` and return the handle the
    /// session parks on.
    pub fn add(&self, fingerprint: &str) -> Result<oneshot::Receiver<()>> {
        debug!(fingerprint, "adding verify waiter");

        let mut waiters = self.inner.lock().map_err(|_| CoreError::Lock)?;
        if waiters.contains_key(fingerprint) {
            return Err(CoreError::DuplicateWaiter(fingerprint.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        waiters.insert(fingerprint.to_string(), tx);
        Ok(rx)
    }

    /// Wake the waiter for `fingerprint`. Returns false when none was
    /// registered.
    pub fn complete(&self, fingerprint: &str) -> bool {
        debug!(fingerprint, "completing verify waiter");

        let sender = match self.inner.lock() {
            Ok(mut waiters) => waiters.remove(fingerprint),
            Err(_) => return false,
        };
        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `fingerprint`, cancelling the parked session.
    /// Returns false when none was registered.
    pub fn remove(&self, fingerprint: &str) -> bool {
        debug!(fingerprint, "removing verify waiter");

        match self.inner.lock() {
            Ok(mut waiters) => waiters.remove(fingerprint).is_some(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_wakes_the_waiter() {
        let waiters = VerifyWaiters::new();

        let rx = waiters.add("fp-1").unwrap();
        assert!(waiters.complete("fp-1"));
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn one_waiter_per_fingerprint() {
        let waiters = VerifyWaiters::new();

        let _rx = waiters.add("fp-1").unwrap();
        assert!(matches!(
            waiters.add("fp-1"),
            Err(CoreError::DuplicateWaiter(_))
        ));

        // a different peer is unaffected
        assert!(waiters.add("fp-2").is_ok());
    }

    #[tokio::test]
    async fn remove_cancels_the_waiter() {
        let waiters = VerifyWaiters::new();

        let rx = waiters.add("fp-1").unwrap();
        assert!(waiters.remove("fp-1"));
        assert!(rx.await.is_err());

        // the slot is free again
        assert!(waiters.add("fp-1").is_ok());
    }

    #[test]
    fn completing_nothing_reports_false() {
        let waiters = VerifyWaiters::new();
        assert!(!waiters.complete("fp-1"));
        assert!(!waiters.remove("fp-1"));
    }
}
