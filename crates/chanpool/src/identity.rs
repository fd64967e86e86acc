//! Per-identity pool
//!
//! One `IdentityPool` serves every caller whose parameters derive the same
//! [`IdentityKey`]. It keeps as many leases as the channel count source
//! asks for and hands out the least-loaded one.
//!
//! # Locking
//!
//! A single async mutex guards the lease collection. It is held for
//! bookkeeping only (resize, selection, count updates, re-sort) and is
//! released while a lease's handle is being created, so a slow handshake
//! never stalls acquirers that select a different lease or releases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use chanpool_core::error::CreationError;
use chanpool_core::traits::{ChannelCountSource, HandleFactory};
use chanpool_core::types::IdentityKey;

use crate::collection::OrderedLeaseCollection;
use crate::diagnostics::{IdentitySummary, LeaseSnapshot};
use crate::lease::{ClientLease, HandleAttempt, LeaseCollection};

/// Fewest leases an identity keeps, whatever the configured count
pub const MIN_CHANNEL_COUNT: usize = 1;

/// Leases for a single identity
pub struct IdentityPool<F: HandleFactory> {
    key: IdentityKey,
    factory: Arc<F>,
    channels: Arc<dyn ChannelCountSource>,
    leases: Mutex<LeaseCollection<F::Handle>>,
    /// Next tie-break token to hand out
    next_token: AtomicU64,
}

impl<F: HandleFactory> IdentityPool<F> {
    /// Create an empty pool. Leases are added on the first acquire.
    pub fn new(key: IdentityKey, factory: Arc<F>, channels: Arc<dyn ChannelCountSource>) -> Self {
        Self {
            key,
            factory,
            channels,
            leases: Mutex::new(OrderedLeaseCollection::new(ClientLease::compare)),
            next_token: AtomicU64::new(1),
        }
    }

    /// Identity served by this pool
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// Acquire a handle from the least-loaded lease.
    ///
    /// Fails only if that lease had to create its handle and the factory
    /// failed; the lease stays retryable for the next acquire.
    pub async fn acquire(&self) -> Result<Arc<F::Handle>, CreationError> {
        let (lease, attempt) = {
            let mut leases = self.leases.lock().await;
            self.resize(&mut leases);

            let lease = Arc::clone(
                leases
                    .peek_min()
                    .expect("resize leaves at least one lease"),
            );
            let attempt = lease.begin_acquire(&self.factory, &self.key);

            // Cached handles are counted before the lock drops, so the next
            // selector already sees the new load
            if let HandleAttempt::Ready(handle) = &attempt {
                let outcome = Ok(Arc::clone(handle));
                lease.complete_acquire(&attempt, &outcome, &mut leases);
                return outcome;
            }
            (lease, attempt)
        };

        let outcome = attempt.outcome().await;

        let mut leases = self.leases.lock().await;
        lease.complete_acquire(&attempt, &outcome, &mut leases);
        outcome
    }

    /// Release a handle previously returned by [`acquire`](Self::acquire).
    ///
    /// Returns `false` if no live lease owns the handle, either because a
    /// shrink dropped it or because it came from another identity.
    pub async fn release(&self, handle: &Arc<F::Handle>) -> bool {
        let mut leases = self.leases.lock().await;
        let lease = match leases.find_linear(|lease| lease.matches_handle(handle)) {
            Some(lease) => Arc::clone(lease),
            None => return false,
        };
        lease.release(&mut leases);
        true
    }

    /// Point-in-time view of every lease, in selection order
    pub async fn snapshot(&self) -> Vec<LeaseSnapshot> {
        let leases = self.leases.lock().await.snapshot();
        leases.iter().map(LeaseSnapshot::of).collect()
    }

    /// Sum of active counts across this identity's leases
    pub async fn active_count(&self) -> usize {
        let leases = self.leases.lock().await;
        leases.iter().map(|lease| lease.active_count()).sum()
    }

    /// Number of leases currently held
    pub async fn lease_count(&self) -> usize {
        self.leases.lock().await.len()
    }

    /// Printable summary of this identity
    pub async fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            key: self.key.clone(),
            leases: self.snapshot().await,
        }
    }

    /// Reconcile the lease count with the configured target.
    ///
    /// Shrinking drops the most heavily leased lease first. Holders of its
    /// handle keep using it; their later releases find no owner.
    fn resize(&self, leases: &mut LeaseCollection<F::Handle>) {
        let target = self
            .channels
            .target_channel_count()
            .max(MIN_CHANNEL_COUNT);

        while leases.len() > target {
            match leases.remove_max() {
                Some(evicted) => tracing::debug!(
                    "Dropping lease #{} for {} ({} active) to reach {} channels",
                    evicted.token(),
                    self.key,
                    evicted.active_count(),
                    target
                ),
                None => break,
            }
        }

        while leases.len() < target {
            let token = self.next_token.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Adding lease #{} for {}", token, self.key);
            leases.add(Arc::new(ClientLease::new(token)));
        }
    }
}
