//! 策略缓存与后台刷新任务
//!
//! The cache is an explicit read-through layer for the operator surface.
//! Request pipelines never read it; authorization always goes to the store.

use crate::{
    models::role::{OperatorPolicy, Permission, Role},
    repository::{IdentityStore, StoreResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, RwLock},
    task::JoinHandle,
    time::MissedTickBehavior,
};

/// Policy-relevant reference data at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub operator_policies: Vec<OperatorPolicy>,
    pub refreshed_at: DateTime<Utc>,
}

pub struct PolicyCache {
    store: Arc<dyn IdentityStore>,
    snapshot: RwLock<Option<Arc<PolicySnapshot>>>,
}

impl PolicyCache {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(None),
        }
    }

    async fn load(&self) -> StoreResult<PolicySnapshot> {
        Ok(PolicySnapshot {
            roles: self.store.list_roles().await?,
            permissions: self.store.list_permissions().await?,
            operator_policies: self.store.list_operator_policies().await?,
            refreshed_at: Utc::now(),
        })
    }

    /// Re-read from the store. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> StoreResult<Arc<PolicySnapshot>> {
        let snapshot = Arc::new(self.load().await?);
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn snapshot(&self) -> Option<Arc<PolicySnapshot>> {
        self.snapshot.read().await.clone()
    }

    /// Cached snapshot, or a fresh one on a miss
    pub async fn snapshot_or_refresh(&self) -> StoreResult<Arc<PolicySnapshot>> {
        if let Some(snapshot) = self.snapshot().await {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }
}

/// Refresh `cache` every `interval` until `shutdown` flips to true.
///
/// A failed cycle is logged and retried on the next tick.
pub fn spawn_policy_refresh(
    cache: Arc<PolicyCache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Policy refresh job started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match cache.refresh().await {
                        Ok(snapshot) => {
                            tracing::debug!(
                                roles = snapshot.roles.len(),
                                permissions = snapshot.permissions.len(),
                                operator_policies = snapshot.operator_policies.len(),
                                "Policy cache refreshed"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Policy cache refresh failed");
                            metrics::counter!("authz_policy_refresh_failures_total").increment(1);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Policy refresh job stopped");
    })
}
