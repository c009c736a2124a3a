//! Background removal of expired access tokens.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use warden_auth::GrantStorage;

/// Periodically calls `remove_old_access_tokens(lifespan)` on `grants`.
#[derive(Clone)]
pub struct AccessTokenSweeper {
    grants: Arc<dyn GrantStorage>,
    lifespan: Duration,
    interval: Duration,
}

impl AccessTokenSweeper {
    pub fn new(grants: Arc<dyn GrantStorage>, lifespan: Duration, interval: Duration) -> Self {
        Self {
            grants,
            lifespan,
            interval,
        }
    }

    /// Runs one sweep and returns the number of removed tokens.
    pub async fn sweep_once(&self) -> u64 {
        let lifespan = time::Duration::try_from(self.lifespan).unwrap_or(time::Duration::MAX);
        match self.grants.remove_old_access_tokens(lifespan).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Removed expired access tokens");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Access token sweep failed");
                0
            }
        }
    }

    /// Starts the sweep loop. Returns `None` when the interval is zero.
    ///
    /// The loop exits when `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self.interval.is_zero() {
            tracing::info!("Access token sweeper disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Access token sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use warden_auth::clock::FixedClock;
    use warden_auth::storage::{MemoryClientRegistry, MemoryGrantStorage};
    use warden_auth::types::{Client, GrantRequest, Session, SessionKind};

    fn store() -> Arc<MemoryGrantStorage> {
        let client = Client::new("siri", vec!["core".to_string()]);
        let clients = Arc::new(MemoryClientRegistry::from_clients([client]));
        let clock = Arc::new(FixedClock::new(datetime!(2024-06-01 12:00:00 UTC)));
        Arc::new(MemoryGrantStorage::new(clients).with_clock(clock))
    }

    fn request(id: &str, requested_at: time::OffsetDateTime) -> GrantRequest {
        GrantRequest::new(
            id,
            requested_at,
            Client::new("siri", vec!["core".to_string()]),
            Session::new("alice"),
        )
    }

    #[tokio::test]
    async fn test_sweep_once_removes_old_tokens() {
        let grants = store();
        grants
            .create(SessionKind::Access, "old", &request("r1", datetime!(2024-06-01 10:00:00 UTC)))
            .await
            .unwrap();
        grants
            .create(SessionKind::Access, "fresh", &request("r2", datetime!(2024-06-01 11:30:00 UTC)))
            .await
            .unwrap();

        let sweeper = AccessTokenSweeper::new(grants.clone(), Duration::from_secs(3600), Duration::ZERO);
        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(grants.get(SessionKind::Access, "old").await.is_err());
        assert!(grants.get(SessionKind::Access, "fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_interval_disables() {
        let sweeper = AccessTokenSweeper::new(store(), Duration::from_secs(3600), Duration::ZERO);
        assert!(sweeper.start(CancellationToken::new()).is_none());
    }

    #[tokio::test]
    async fn test_loop_sweeps_and_stops_on_cancel() {
        let grants = store();
        grants
            .create(SessionKind::Access, "old", &request("r1", datetime!(2024-06-01 10:00:00 UTC)))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = AccessTokenSweeper::new(grants.clone(), Duration::from_secs(3600), Duration::from_millis(10))
            .start(shutdown.clone())
            .unwrap();

        // the first tick fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while grants.get(SessionKind::Access, "old").await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
