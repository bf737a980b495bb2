//! Idle session expiry.

use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default interval between sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle time after which a session is evicted.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAP_INTERVAL,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Periodically evicts sessions that have been idle past the timeout.
pub struct ExpiryReaper {
    store: Arc<SessionStore>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(store: Arc<SessionStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Runs one sweep and returns the number of evicted sessions.
    pub async fn sweep(&self) -> usize {
        let evicted = self.store.evict_idle(self.config.timeout).await;
        for session_id in &evicted {
            info!(%session_id, timeout_secs = self.config.timeout.as_secs(), "Evicted idle session");
        }
        if !evicted.is_empty() {
            let remaining = self.store.len().await;
            debug!(evicted = evicted.len(), remaining, "Session sweep complete");
        }
        evicted.len()
    }

    /// Spawns the sweep loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            info!("Session reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_idle_sessions() {
        let store = Arc::new(SessionStore::new());
        let reaper = ExpiryReaper::new(store.clone(), ReaperConfig::default());
        let idle = store.create().await;

        tokio::time::advance(Duration::from_secs(599)).await;
        let active = store.create().await;
        assert_eq!(reaper.sweep().await, 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reaper.sweep().await, 1);
        assert_eq!(store.get(idle).await.unwrap_err(), SessionError::NotFound(idle));
        assert!(store.get(active).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_evicted_within_one_interval() {
        let store = Arc::new(SessionStore::new());
        let shutdown = CancellationToken::new();
        let handle = ExpiryReaper::new(store.clone(), ReaperConfig::default()).spawn(shutdown.clone());
        let id = store.create().await;

        let deadline = DEFAULT_SESSION_TIMEOUT + DEFAULT_REAP_INTERVAL + Duration::from_secs(1);
        tokio::time::sleep(deadline).await;

        assert!(store.get(id).await.is_err());
        assert!(store.interrupt(id).await.is_err());
        assert!(store.begin_turn(id).await.is_err());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_touched_session_survives() {
        let store = Arc::new(SessionStore::new());
        let shutdown = CancellationToken::new();
        let handle = ExpiryReaper::new(store.clone(), ReaperConfig::default()).spawn(shutdown.clone());
        let id = store.create().await;

        for _ in 0..15 {
            tokio::time::sleep(Duration::from_secs(120)).await;
            store.touch(id).await.unwrap();
        }
        assert!(store.get(id).await.is_ok());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_sweep_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let reaper = ExpiryReaper::new(Arc::new(SessionStore::new()), ReaperConfig::default());
        assert_send(reaper.sweep());
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let store = Arc::new(SessionStore::new());
        let shutdown = CancellationToken::new();
        let handle = ExpiryReaper::new(store, ReaperConfig::default()).spawn(shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
