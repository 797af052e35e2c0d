//! Approval request storage.
//!
//! The store owns every approval record. Mutations (create, resolve) take the
//! write half of a single lock, so two resolvers racing on the same id are
//! serialized and only the first one sees a PENDING record. Reads take the
//! read half and always observe whole records.
//!
//! Records are never removed while the process runs.

use crate::approval::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::approval::types::{ApprovalRequest, ApprovalStatus, Resolution};
use crate::policy::types::Intent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// How many fresh identifiers to try before giving up on a create.
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("approval request '{0}' not found")]
    NotFound(String),

    #[error("approval request '{id}' is already {status}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("id generator returned {attempts} identifiers that were already taken")]
    IdCollision { attempts: usize },
}

/// Storage for approval requests.
pub trait ApprovalStore: Send + Sync {
    /// Record a new PENDING request and return its fresh identifier.
    fn create(&self, intent: Intent, reason: String) -> Result<String, StoreError>;

    fn get(&self, id: &str) -> Result<ApprovalRequest, StoreError>;

    /// Snapshot of every record, in creation order.
    fn list(&self) -> Vec<ApprovalRequest>;

    /// Move a PENDING request to its terminal state. First resolver wins;
    /// later calls get `AlreadyResolved` and change nothing.
    fn resolve(&self, id: &str, resolution: Resolution) -> Result<ApprovalRequest, StoreError>;
}

#[derive(Default)]
struct Records {
    by_id: HashMap<String, ApprovalRequest>,
    /// Ids in creation order.
    order: Vec<String>,
}

/// Process-local approval store.
pub struct InMemoryApprovalStore {
    records: RwLock<Records>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryApprovalStore {
    /// A store using random UUIDs and the system clock.
    pub fn new() -> Self {
        Self::with_parts(Arc::new(UuidGenerator), Arc::new(SystemClock))
    }

    pub fn with_parts(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            ids,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records still waiting on a human, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.list().into_iter().filter(|r| r.is_pending()).collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn create(&self, intent: Intent, reason: String) -> Result<String, StoreError> {
        let mut records = self.write();

        // Generated under the write lock so the uniqueness check and the
        // insert cannot interleave with another create.
        let id = (0..MAX_ID_ATTEMPTS)
            .map(|_| self.ids.next_id())
            .find(|candidate| !records.by_id.contains_key(candidate))
            .ok_or(StoreError::IdCollision {
                attempts: MAX_ID_ATTEMPTS,
            })?;

        let request = ApprovalRequest {
            id: id.clone(),
            intent,
            status: ApprovalStatus::Pending,
            reason,
            created_at: self.clock.now(),
            resolved_at: None,
        };
        records.by_id.insert(id.clone(), request);
        records.order.push(id.clone());

        tracing::debug!(id = %id, "Approval request created");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<ApprovalRequest, StoreError> {
        self.read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Vec<ApprovalRequest> {
        let records = self.read();
        records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect()
    }

    fn resolve(&self, id: &str, resolution: Resolution) -> Result<ApprovalRequest, StoreError> {
        let mut records = self.write();
        let now = self.clock.now();

        let record = records
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(StoreError::AlreadyResolved {
                id: id.to_string(),
                status: record.status,
            });
        }

        record.status = resolution.status();
        record.resolved_at = Some(now);
        tracing::debug!(id = %id, status = %record.status, "Approval request resolved");
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::clock::{ManualClock, SequentialIdGenerator};
    use chrono::{Duration, TimeZone, Utc};

    fn store_with_clock() -> (InMemoryApprovalStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        ));
        let store = InMemoryApprovalStore::with_parts(
            Arc::new(SequentialIdGenerator::new("req")),
            clock.clone(),
        );
        (store, clock)
    }

    fn intent() -> Intent {
        Intent::new("stripe.charge", "charge").with_arg("amount", 5000)
    }

    #[test]
    fn test_create_and_get() {
        let (store, clock) = store_with_clock();
        let id = store.create(intent(), "large charge".into()).unwrap();
        assert_eq!(id, "req-1");

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, ApprovalStatus::Pending);
        assert_eq!(record.reason, "large charge");
        assert_eq!(record.intent, intent());
        assert_eq!(record.created_at, clock.now());
        assert!(record.resolved_at.is_none());
    }

    #[test]
    fn test_get_unknown() {
        let (store, _) = store_with_clock();
        assert_eq!(
            store.get("missing"),
            Err(StoreError::NotFound("missing".into()))
        );
    }

    #[test]
    fn test_list_in_creation_order() {
        let (store, _) = store_with_clock();
        for _ in 0..5 {
            store.create(intent(), "r".into()).unwrap();
        }
        let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["req-1", "req-2", "req-3", "req-4", "req-5"]);
    }

    #[test]
    fn test_resolve_stamps_time() {
        let (store, clock) = store_with_clock();
        let id = store.create(intent(), "r".into()).unwrap();
        clock.advance(Duration::minutes(3));

        let record = store.resolve(&id, Resolution::Approve).unwrap();
        assert_eq!(record.status, ApprovalStatus::Approved);
        assert_eq!(record.resolved_at, Some(clock.now()));
        assert_eq!(store.get(&id).unwrap(), record);
    }

    #[test]
    fn test_second_resolve_is_rejected() {
        let (store, clock) = store_with_clock();
        let id = store.create(intent(), "r".into()).unwrap();
        let first = store.resolve(&id, Resolution::Reject).unwrap();

        clock.advance(Duration::minutes(1));
        assert_eq!(
            store.resolve(&id, Resolution::Approve),
            Err(StoreError::AlreadyResolved {
                id: id.clone(),
                status: ApprovalStatus::Rejected,
            })
        );
        assert_eq!(store.get(&id).unwrap(), first);
    }

    #[test]
    fn test_resolve_unknown() {
        let (store, _) = store_with_clock();
        assert_eq!(
            store.resolve("ghost", Resolution::Approve),
            Err(StoreError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn test_pending_filter() {
        let (store, _) = store_with_clock();
        let a = store.create(intent(), "r".into()).unwrap();
        let b = store.create(intent(), "r".into()).unwrap();
        store.resolve(&a, Resolution::Approve).unwrap();

        let pending: Vec<_> = store.pending().into_iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![b]);
        assert_eq!(store.len(), 2);
    }

    struct StuckGenerator;

    impl IdGenerator for StuckGenerator {
        fn next_id(&self) -> String {
            "same".to_string()
        }
    }

    #[test]
    fn test_colliding_generator_never_reuses_ids() {
        let store =
            InMemoryApprovalStore::with_parts(Arc::new(StuckGenerator), Arc::new(SystemClock));
        assert_eq!(store.create(intent(), "r".into()).unwrap(), "same");
        assert_eq!(
            store.create(intent(), "r".into()),
            Err(StoreError::IdCollision {
                attempts: MAX_ID_ATTEMPTS
            })
        );
        assert_eq!(store.len(), 1);
    }
}
