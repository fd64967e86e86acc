//! Client lease: one lazily created handle plus its active-lease count
//!
//! # Creation state
//!
//! A lease starts `NotStarted`. The first acquirer to select it starts a
//! creation attempt and stores it as a shared future, so every acquirer that
//! selects the lease before the attempt resolves awaits that same attempt.
//! Success is memoized; failure is not, and the next acquirer starts over.
//!
//! All state transitions happen while the owning identity pool holds its
//! lock. The lease never owns its container: operations that change the
//! ordering key take the container borrowed from the lock guard and re-sort
//! it before returning.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use chanpool_core::error::CreationError;
use chanpool_core::traits::HandleFactory;
use chanpool_core::types::IdentityKey;

use crate::collection::OrderedLeaseCollection;

/// Outcome of one creation attempt, as seen by each of its waiters
pub type CreationOutcome<H> = Result<Arc<H>, CreationError>;

/// Creation attempt shared by every acquirer that selected the lease
pub type CreationFuture<H> = Shared<BoxFuture<'static, CreationOutcome<H>>>;

/// Collection type leases live in
pub type LeaseCollection<H> = OrderedLeaseCollection<Arc<ClientLease<H>>>;

enum CreationState<H> {
    NotStarted,
    InProgress(CreationFuture<H>),
    Succeeded(Arc<H>),
    Failed,
}

/// Creation status, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// No attempt made yet
    Idle,
    /// An attempt is outstanding
    Creating,
    /// Handle created and cached
    Ready,
    /// Last attempt failed; the next acquire retries
    Failed,
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseStatus::Idle => write!(f, "idle"),
            LeaseStatus::Creating => write!(f, "creating"),
            LeaseStatus::Ready => write!(f, "ready"),
            LeaseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A handle that is either cached or still being created
pub enum HandleAttempt<H> {
    /// Handle already exists
    Ready(Arc<H>),
    /// Creation attempt shared with any other waiters
    Pending(CreationFuture<H>),
}

impl<H: Send + Sync + 'static> HandleAttempt<H> {
    /// Wait for the attempt to resolve
    pub async fn outcome(&self) -> CreationOutcome<H> {
        match self {
            HandleAttempt::Ready(handle) => Ok(Arc::clone(handle)),
            HandleAttempt::Pending(future) => future.clone().await,
        }
    }
}

/// One pooled channel slot
pub struct ClientLease<H> {
    /// Stable tie-break token, fixed at construction
    token: u64,
    /// Callers currently holding this lease's handle
    active: AtomicUsize,
    state: Mutex<CreationState<H>>,
}

impl<H: Send + Sync + 'static> ClientLease<H> {
    /// Create a lease with no handle
    pub fn new(token: u64) -> Self {
        Self {
            token,
            active: AtomicUsize::new(0),
            state: Mutex::new(CreationState::NotStarted),
        }
    }

    /// Tie-break token
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Number of callers currently holding this lease's handle
    pub fn active_count(&self) -> usize {
        self.active.load(AtomicOrdering::Acquire)
    }

    /// Ordering key: least loaded first, ties broken by token
    pub fn compare(a: &Arc<Self>, b: &Arc<Self>) -> Ordering {
        (a.active_count(), a.token).cmp(&(b.active_count(), b.token))
    }

    /// Current creation status
    pub fn status(&self) -> LeaseStatus {
        match &*self.lock_state() {
            CreationState::NotStarted => LeaseStatus::Idle,
            CreationState::InProgress(_) => LeaseStatus::Creating,
            CreationState::Succeeded(_) => LeaseStatus::Ready,
            CreationState::Failed => LeaseStatus::Failed,
        }
    }

    /// True only if creation succeeded and produced exactly `handle`
    pub fn matches_handle(&self, handle: &Arc<H>) -> bool {
        match &*self.lock_state() {
            CreationState::Succeeded(own) => Arc::ptr_eq(own, handle),
            _ => false,
        }
    }

    /// First half of an acquire, run under the identity lock.
    ///
    /// Returns the cached handle, joins the outstanding attempt, or starts a
    /// new attempt if none exists or the last one failed.
    ///
    /// An attempt that already resolved but whose waiters have not yet
    /// relocked is settled here: success is cached, failure is retried.
    pub fn begin_acquire<F>(&self, factory: &Arc<F>, key: &IdentityKey) -> HandleAttempt<H>
    where
        F: HandleFactory<Handle = H>,
    {
        let mut state = self.lock_state();
        let resolved = match &*state {
            CreationState::Succeeded(handle) => return HandleAttempt::Ready(Arc::clone(handle)),
            CreationState::InProgress(future) => match future.peek() {
                None => return HandleAttempt::Pending(future.clone()),
                Some(outcome) => Some(outcome.clone()),
            },
            CreationState::NotStarted | CreationState::Failed => None,
        };

        if let Some(Ok(handle)) = resolved {
            *state = CreationState::Succeeded(Arc::clone(&handle));
            return HandleAttempt::Ready(handle);
        }

        let future = self.start_creation(Arc::clone(factory), key.clone());
        *state = CreationState::InProgress(future.clone());
        HandleAttempt::Pending(future)
    }

    /// Second half of an acquire, run under the identity lock once the
    /// attempt resolved.
    ///
    /// Records the outcome if `attempt` is still the lease's current attempt
    /// and, on success, counts the caller as a holder.
    pub fn complete_acquire(
        &self,
        attempt: &HandleAttempt<H>,
        outcome: &CreationOutcome<H>,
        container: &mut LeaseCollection<H>,
    ) {
        if let HandleAttempt::Pending(future) = attempt {
            let mut state = self.lock_state();
            let current = matches!(&*state, CreationState::InProgress(f) if f.ptr_eq(future));
            if current {
                *state = match outcome {
                    Ok(handle) => CreationState::Succeeded(Arc::clone(handle)),
                    Err(_) => CreationState::Failed,
                };
            }
        }

        if outcome.is_ok() {
            self.active.fetch_add(1, AtomicOrdering::AcqRel);
            container.notify_changed();
        }
    }

    /// Drop one holder, never going below zero
    pub fn release(&self, container: &mut LeaseCollection<H>) {
        let _ = self
            .active
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |n| {
                n.checked_sub(1)
            });
        container.notify_changed();
    }

    fn start_creation<F>(&self, factory: Arc<F>, key: IdentityKey) -> CreationFuture<H>
    where
        F: HandleFactory<Handle = H>,
    {
        let token = self.token;
        async move {
            tracing::debug!("Creating client for {} (lease #{})", key, token);
            match factory
                .create(key.endpoint(), key.credentials(), key.options())
                .await
            {
                Ok(handle) => {
                    tracing::debug!("Client created for {} (lease #{})", key, token);
                    Ok(Arc::new(handle))
                }
                Err(e) => {
                    tracing::warn!(
                        "Client creation failed for {} (lease #{}): {}",
                        key,
                        token,
                        e
                    );
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock_state(&self) -> MutexGuard<'_, CreationState<H>> {
        // State is always left consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: Send + Sync + 'static> fmt::Debug for ClientLease<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLease")
            .field("token", &self.token)
            .field("active", &self.active_count())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chanpool_core::types::{ConnectionOptions, Credentials, Endpoint};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    /// Factory replaying a fixed script of outcomes
    struct ScriptedFactory {
        script: Mutex<VecDeque<Result<u32, CreationError>>>,
        calls: AtomicU32,
    }

    impl ScriptedFactory {
        fn new(script: Vec<Result<u32, CreationError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl HandleFactory for ScriptedFactory {
        type Handle = u32;

        async fn create(
            &self,
            _endpoint: &Endpoint,
            _credentials: &Credentials,
            _options: &ConnectionOptions,
        ) -> Result<u32, CreationError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            tokio::task::yield_now().await;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CreationError::Unavailable("script exhausted".into())))
        }
    }

    fn key() -> IdentityKey {
        IdentityKey::new(
            Credentials::Default,
            Endpoint::new("db.example.com", 443),
            ConnectionOptions::new(),
        )
    }

    fn container_with(lease: &Arc<ClientLease<u32>>) -> LeaseCollection<u32> {
        let mut container = OrderedLeaseCollection::new(ClientLease::compare);
        container.add(Arc::clone(lease));
        container
    }

    #[tokio::test]
    async fn test_lease_creates_once_and_memoizes() {
        let factory = ScriptedFactory::new(vec![Ok(7)]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        for expected in 1..=2 {
            let attempt = lease.begin_acquire(&factory, &key());
            let outcome = attempt.outcome().await;
            lease.complete_acquire(&attempt, &outcome, &mut container);
            assert_eq!(*outcome.unwrap(), 7);
            assert_eq!(lease.active_count(), expected);
        }

        assert_eq!(factory.calls(), 1);
        assert_eq!(lease.status(), LeaseStatus::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_selectors_share_one_attempt() {
        let factory = ScriptedFactory::new(vec![Ok(11)]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let first = lease.begin_acquire(&factory, &key());
        let second = lease.begin_acquire(&factory, &key());
        assert_eq!(lease.status(), LeaseStatus::Creating);

        let (a, b) = tokio::join!(first.outcome(), second.outcome());
        lease.complete_acquire(&first, &a, &mut container);
        lease.complete_acquire(&second, &b, &mut container);

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.calls(), 1);
        assert_eq!(lease.active_count(), 2);
        assert!(lease.matches_handle(&a));
    }

    #[tokio::test]
    async fn test_failure_is_retryable() {
        let factory = ScriptedFactory::new(vec![
            Err(CreationError::AuthenticationFailed("expired".into())),
            Ok(3),
        ]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let attempt = lease.begin_acquire(&factory, &key());
        let outcome = attempt.outcome().await;
        lease.complete_acquire(&attempt, &outcome, &mut container);
        assert!(matches!(
            outcome,
            Err(CreationError::AuthenticationFailed(_))
        ));
        assert_eq!(lease.status(), LeaseStatus::Failed);
        assert_eq!(lease.active_count(), 0);

        let attempt = lease.begin_acquire(&factory, &key());
        let outcome = attempt.outcome().await;
        lease.complete_acquire(&attempt, &outcome, &mut container);
        assert_eq!(*outcome.unwrap(), 3);
        assert_eq!(lease.active_count(), 1);
        assert_eq!(factory.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_clobber_new_attempt() {
        let factory = ScriptedFactory::new(vec![
            Err(CreationError::Unavailable("down".into())),
            Ok(5),
        ]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let first = lease.begin_acquire(&factory, &key());
        let second = lease.begin_acquire(&factory, &key());
        let failed = first.outcome().await;
        lease.complete_acquire(&first, &failed, &mut container);

        // A new selector retries before the second waiter records its result
        let retry = lease.begin_acquire(&factory, &key());
        let stale = second.outcome().await;
        lease.complete_acquire(&second, &stale, &mut container);
        assert_eq!(lease.status(), LeaseStatus::Creating);

        let outcome = retry.outcome().await;
        lease.complete_acquire(&retry, &outcome, &mut container);
        assert_eq!(lease.status(), LeaseStatus::Ready);
        assert_eq!(lease.active_count(), 1);
    }

    #[tokio::test]
    async fn test_resolved_failure_retried_before_waiter_relocks() {
        let factory = ScriptedFactory::new(vec![
            Err(CreationError::Unavailable("down".into())),
            Ok(8),
        ]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let first = lease.begin_acquire(&factory, &key());
        let failed = first.outcome().await;
        assert!(failed.is_err());

        // First waiter has not recorded its failure yet
        let second = lease.begin_acquire(&factory, &key());
        let outcome = second.outcome().await;
        assert_eq!(**outcome.as_ref().unwrap(), 8);
        assert_eq!(factory.calls(), 2);

        lease.complete_acquire(&second, &outcome, &mut container);
        lease.complete_acquire(&first, &failed, &mut container);
        assert_eq!(lease.status(), LeaseStatus::Ready);
        assert_eq!(lease.active_count(), 1);
    }

    #[tokio::test]
    async fn test_resolved_success_cached_before_waiter_relocks() {
        let factory = ScriptedFactory::new(vec![Ok(4)]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let first = lease.begin_acquire(&factory, &key());
        let created = first.outcome().await;

        let second = lease.begin_acquire(&factory, &key());
        assert!(matches!(second, HandleAttempt::Ready(_)));
        assert_eq!(lease.status(), LeaseStatus::Ready);

        let reused = second.outcome().await;
        assert!(Arc::ptr_eq(created.as_ref().unwrap(), reused.as_ref().unwrap()));

        lease.complete_acquire(&first, &created, &mut container);
        lease.complete_acquire(&second, &reused, &mut container);
        assert_eq!(lease.active_count(), 2);
        assert_eq!(factory.calls(), 1);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let lease = Arc::new(ClientLease::<u32>::new(1));
        let mut container = container_with(&lease);

        lease.release(&mut container);
        assert_eq!(lease.active_count(), 0);
    }

    #[tokio::test]
    async fn test_matches_handle_by_identity() {
        let factory = ScriptedFactory::new(vec![Ok(9)]);
        let lease = Arc::new(ClientLease::new(1));
        let mut container = container_with(&lease);

        let attempt = lease.begin_acquire(&factory, &key());
        let outcome = attempt.outcome().await;
        lease.complete_acquire(&attempt, &outcome, &mut container);
        let handle = outcome.unwrap();

        assert!(lease.matches_handle(&handle));
        // Same value, different instance
        assert!(!lease.matches_handle(&Arc::new(9)));
    }

    #[test]
    fn test_compare_orders_by_count_then_token() {
        let busy = Arc::new(ClientLease::<u32>::new(1));
        busy.active.store(2, AtomicOrdering::SeqCst);
        let idle_low = Arc::new(ClientLease::<u32>::new(2));
        let idle_high = Arc::new(ClientLease::<u32>::new(3));

        assert_eq!(ClientLease::compare(&idle_low, &busy), Ordering::Less);
        assert_eq!(ClientLease::compare(&idle_low, &idle_high), Ordering::Less);
        assert_eq!(ClientLease::compare(&busy, &idle_high), Ordering::Greater);
    }
}
