//! Per-turn interruption.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cancellation handle for one session's in-flight relay.
///
/// A fresh handle is minted each time a turn is accepted, so an interrupt that
/// arrives after a reply has already finished cannot leak into the next turn.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(CancellationToken);

impl InterruptFlag {
    /// Requests that the in-flight relay stop. Idempotent.
    pub fn set(&self) {
        self.0.cancel();
    }

    /// Reports whether an interrupt is pending. Does not clear the flag.
    pub fn consume(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the flag is set.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.0.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_is_idempotent_and_sticky() {
        let flag = InterruptFlag::default();
        assert!(!flag.consume());

        flag.set();
        flag.set();
        assert!(flag.consume());
        assert!(flag.consume(), "reading must not clear the flag");
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let flag = InterruptFlag::default();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };

        flag.set();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }
}
