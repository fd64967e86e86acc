//! Process-wide registry of identity pools
//!
//! The registry is the entry point for callers. It derives an
//! [`IdentityKey`] from the caller's parameters, finds or creates the
//! [`IdentityPool`] for it and delegates. Applications construct one
//! registry at startup and share it behind an `Arc`, the same way they share
//! any other process state.
//!
//! Identities never contend with each other: the map is sharded and each
//! pool has its own lock.

use std::sync::Arc;

use dashmap::DashMap;

use chanpool_core::config::LiveChannelCount;
use chanpool_core::error::CreationError;
use chanpool_core::traits::{ChannelCountSource, HandleFactory};
use chanpool_core::types::{ConnectionParams, IdentityKey};

use crate::diagnostics::IdentitySummary;
use crate::identity::IdentityPool;

/// Identity pools indexed by key
pub struct PoolRegistry<F: HandleFactory> {
    pools: DashMap<IdentityKey, Arc<IdentityPool<F>>>,
    factory: Arc<F>,
    channels: Arc<dyn ChannelCountSource>,
}

impl<F: HandleFactory> PoolRegistry<F> {
    /// Create a registry creating handles with `factory` and sizing pools
    /// from `channels`
    pub fn new(factory: F, channels: impl ChannelCountSource + 'static) -> Self {
        Self::with_shared(Arc::new(factory), Arc::new(channels))
    }

    /// Create a registry from collaborators shared with other components
    pub fn with_shared(factory: Arc<F>, channels: Arc<dyn ChannelCountSource>) -> Self {
        Self {
            pools: DashMap::new(),
            factory,
            channels,
        }
    }

    /// Acquire a handle for the identity described by `params`.
    ///
    /// Fails only with the factory's creation error. No timeout is applied
    /// here; wrap the call if one is needed.
    pub async fn acquire(
        &self,
        params: &ConnectionParams,
    ) -> Result<Arc<F::Handle>, CreationError> {
        let pool = self.pool_for(params.identity_key());
        pool.acquire().await
    }

    /// Return a handle acquired with the same `params`.
    ///
    /// Never fails. Handles no live lease recognizes (the lease was dropped
    /// by a shrink, or the parameters name another identity) are logged and
    /// ignored.
    pub async fn release(&self, handle: &Arc<F::Handle>, params: &ConnectionParams) {
        let key = params.identity_key();
        let pool = match self.pools.get(&key) {
            Some(pool) => Arc::clone(pool.value()),
            None => {
                tracing::error!("Release for unknown identity {}; ignoring", key);
                return;
            }
        };

        if !pool.release(handle).await {
            tracing::error!(
                "Released handle is not leased by any client of {}; ignoring",
                key
            );
        }
    }

    /// Pool for `key`, created on first use.
    ///
    /// The entry API holds the shard lock across check-and-insert, so racing
    /// callers always end up with the same pool.
    fn pool_for(&self, key: IdentityKey) -> Arc<IdentityPool<F>> {
        if let Some(pool) = self.pools.get(&key) {
            return Arc::clone(pool.value());
        }

        let pool = self.pools.entry(key.clone()).or_insert_with(|| {
            tracing::debug!("Creating pool for {}", key);
            Arc::new(IdentityPool::new(
                key,
                Arc::clone(&self.factory),
                Arc::clone(&self.channels),
            ))
        });
        Arc::clone(pool.value())
    }

    /// Pool for the identity described by `params`, if one exists
    pub fn get(&self, params: &ConnectionParams) -> Option<Arc<IdentityPool<F>>> {
        self.pools
            .get(&params.identity_key())
            .map(|r| Arc::clone(r.value()))
    }

    /// List all identity pools
    pub fn list(&self) -> Vec<Arc<IdentityPool<F>>> {
        self.pools.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Number of identities with a pool
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Check if no identity has a pool yet
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Per-identity summaries, ordered by identity for stable output
    pub async fn summaries(&self) -> Vec<IdentitySummary> {
        let mut summaries = Vec::with_capacity(self.pools.len());
        for pool in self.list() {
            summaries.push(pool.summary().await);
        }
        summaries.sort_by_key(|summary| summary.key.to_string());
        summaries
    }

    /// Sum of active leases across all identities
    pub async fn total_active_leases(&self) -> usize {
        let mut total = 0;
        for pool in self.list() {
            total += pool.active_count().await;
        }
        total
    }

    /// Human-readable dump of every identity, one per line
    pub async fn dump(&self) -> String {
        self.summaries()
            .await
            .iter()
            .map(|summary| summary.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drop every pool.
    ///
    /// For test isolation only; callers must ensure no acquire or release is
    /// in flight.
    pub fn reset(&self) {
        tracing::debug!("Resetting registry ({} identities)", self.pools.len());
        self.pools.clear();
    }
}

impl<F: HandleFactory + Default> Default for PoolRegistry<F> {
    fn default() -> Self {
        Self::new(F::default(), LiveChannelCount::default())
    }
}
