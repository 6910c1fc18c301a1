//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically scans the store
//! for expired keys and removes them ("active expiry", as opposed to the lazy
//! expiry that happens on access).
//!
//! For FlashMap the sweeper matters beyond reclaiming memory: removing an
//! expired record is what publishes the `__keyevent@0__:expired` notification,
//! and that notification is what lets the expiration listener clean up the
//! keyspace id-set and the secondary indexes of a record nobody reads again.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 100ms)
//! 2. Wakes up and removes expired keys (publishing one notification each)
//! 3. Adapts its interval to the observed expiry rate

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// If this fraction of keys expired in one sweep, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of keys expired in one sweep, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,  // Speed up if >25% of keys are expired
            slowdown_threshold: 0.01, // Slow down if <1% of keys are expired
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flashmap::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Computes the next sweep interval from the fraction of keys that expired.
fn next_interval(config: &ExpiryConfig, current: Duration, keys_before: u64, expired: u64) -> Duration {
    if keys_before == 0 {
        return current;
    }

    let expiry_rate = expired as f64 / keys_before as f64;
    if expiry_rate > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else if expiry_rate < config.slowdown_threshold && expired == 0 {
        (current * 2).min(config.max_interval)
    } else {
        current
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.cleanup_expired();

        let interval = next_interval(&config, current_interval, keys_before, expired);
        if interval != current_interval {
            trace!(
                expired = expired,
                keys_before = keys_before,
                new_interval_ms = interval.as_millis(),
                "Adjusted sweeper interval"
            );
            current_interval = interval;
        }

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::notify::NOTIFY_KEYSPACE_EVENTS;
    use bytes::Bytes;

    fn fast_config() -> ExpiryConfig {
        ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_next_interval() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        // Half the keys expired: speed up
        assert_eq!(next_interval(&config, base, 10, 5), base / 2);
        // Nothing expired: back off
        assert_eq!(next_interval(&config, base, 10, 0), base * 2);
        // Empty store: keep the interval
        assert_eq!(next_interval(&config, base, 0, 0), base);
        // Bounded on both sides
        assert_eq!(
            next_interval(&config, config.min_interval, 10, 10),
            config.min_interval
        );
        assert_eq!(
            next_interval(&config, config.max_interval, 10, 0),
            config.max_interval
        );
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            let key = Bytes::from(format!("session:{}", i));
            engine
                .hset(key.clone(), vec![(Bytes::from("user"), Bytes::from("jon"))])
                .unwrap();
            engine.expire(&key, Duration::from_millis(50));
        }

        // Add a persistent key
        engine
            .sadd(Bytes::from("session"), vec![Bytes::from("0")])
            .unwrap();

        assert_eq!(engine.len(), 11);

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast_config());

        // Wait for keys to expire and be cleaned up
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.exists(&Bytes::from("session")));
    }

    #[tokio::test]
    async fn test_sweeper_publishes_expired_events() {
        let engine = Arc::new(StorageEngine::new());
        engine.config_set(NOTIFY_KEYSPACE_EVENTS, "Ex");
        let mut rx = engine.subscribe();

        let key = Bytes::from("person:42");
        engine
            .hset(key.clone(), vec![(Bytes::from("firstname"), Bytes::from("Jon"))])
            .unwrap();
        engine.expire(&key, Duration::from_millis(20));

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast_config());

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("expired event within a second")
            .unwrap();
        assert_eq!(message.payload, key);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast_config());
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Sweeper is dropped here
        }

        let key = Bytes::from("key");
        engine.sadd(key.clone(), vec![Bytes::from("1")]).unwrap();
        engine.expire(&key, Duration::from_millis(10));

        // Keys should NOT be cleaned up actively since the sweeper is stopped
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.len(), 1);

        // but access triggers lazy expiry
        assert!(!engine.exists(&key));
        assert_eq!(engine.len(), 0);
    }
}
