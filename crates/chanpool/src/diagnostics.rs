//! Diagnostic views of pool state
//!
//! These are copies taken under the identity lock and are only meant for
//! monitoring and tests; they may be stale by the time they are read.

use std::fmt;
use std::sync::Arc;

use chanpool_core::types::IdentityKey;

use crate::lease::{ClientLease, LeaseStatus};

/// State of one lease at snapshot time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSnapshot {
    /// Tie-break token
    pub token: u64,
    /// Active lease count
    pub active: usize,
    /// Creation status
    pub status: LeaseStatus,
}

impl LeaseSnapshot {
    /// Capture a lease's current state
    pub fn of<H: Send + Sync + 'static>(lease: &Arc<ClientLease<H>>) -> Self {
        Self {
            token: lease.token(),
            active: lease.active_count(),
            status: lease.status(),
        }
    }
}

impl fmt::Display for LeaseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} x{}", self.token, self.status, self.active)
    }
}

/// Leases of one identity at snapshot time
#[derive(Debug, Clone)]
pub struct IdentitySummary {
    /// Identity the leases serve
    pub key: IdentityKey,
    /// Leases in selection order
    pub leases: Vec<LeaseSnapshot>,
}

impl IdentitySummary {
    /// Sum of active counts
    pub fn active_count(&self) -> usize {
        self.leases.iter().map(|lease| lease.active).sum()
    }
}

impl fmt::Display for IdentitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} leases, {} active [",
            self.key,
            self.leases.len(),
            self.active_count()
        )?;
        for (i, lease) in self.leases.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", lease)?;
        }
        write!(f, "]")
    }
}
