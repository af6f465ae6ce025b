//! Transaction context: the global version counter and the replication sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::replication::Replication;

/// Collaborator supplying version policy and the replication sink.
///
/// Tables call [`bump_global_version`](Self::bump_global_version) once per
/// externally visible mutation, then ask
/// [`should_propagate_version`](Self::should_propagate_version) for every
/// table reached while propagating the bump.
pub trait TransactionContext: Send + Sync + std::fmt::Debug {
    fn bump_global_version(&self);

    fn global_version(&self) -> u64;

    /// Decide whether a table whose local counter is `local` should be bumped
    /// and propagate further. Implementations update `local` when returning
    /// `true`.
    fn should_propagate_version(&self, local: &mut u64) -> bool;

    fn replication(&self) -> Option<Arc<dyn Replication>>;
}

/// Default context: an atomic global counter, local counters catch up to it.
///
/// A table that already carries the current global version is not bumped
/// again, which ends propagation on cyclic link graphs.
#[derive(Debug, Default)]
pub struct VersionContext {
    global: AtomicU64,
    replication: Option<Arc<dyn Replication>>,
}

impl VersionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replication(replication: Arc<dyn Replication>) -> Self {
        Self {
            global: AtomicU64::new(0),
            replication: Some(replication),
        }
    }
}

impl TransactionContext for VersionContext {
    fn bump_global_version(&self) {
        self.global.fetch_add(1, Ordering::AcqRel);
    }

    fn global_version(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }

    fn should_propagate_version(&self, local: &mut u64) -> bool {
        let global = self.global_version();
        if *local != global {
            *local = global;
            true
        } else {
            false
        }
    }

    fn replication(&self) -> Option<Arc<dyn Replication>> {
        self.replication.clone()
    }
}
