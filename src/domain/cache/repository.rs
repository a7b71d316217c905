//! Cache contract shared by all backends

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::employee::{Employee, EmployeeSearch};

/// Control signal returned on a cache miss.
///
/// Misses are not faults: the read-through orchestrator inspects the kind to
/// decide between retrying, taking the leader path, or falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissKind {
    /// The id is not in the per-record tier and single-flight is disabled
    NotCached,
    /// The fingerprint is not in the per-search tier and single-flight is
    /// disabled, or the search entry was dropped as stale
    SearchNotCached,
    /// The caller won the in-progress race and must perform the fill
    ReadLeaderAssigned,
    /// Another reader is already filling this id
    ReadLeaderAlreadyAssigned,
    /// The caller won the in-progress race for this search
    SearchLeaderAssigned,
    /// Another reader is already filling this search
    SearchLeaderAlreadyAssigned,
}

impl MissKind {
    /// Misses worth retrying: the value may appear shortly, either because
    /// a leader is filling it or because a writer may publish it
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            Self::NotCached
                | Self::SearchNotCached
                | Self::ReadLeaderAlreadyAssigned
                | Self::SearchLeaderAlreadyAssigned
        )
    }

    /// The caller was designated leader and must fill from the record store
    pub fn is_leader_assigned(&self) -> bool {
        matches!(self, Self::ReadLeaderAssigned | Self::SearchLeaderAssigned)
    }
}

impl std::fmt::Display for MissKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotCached => "employee not cached",
            Self::SearchNotCached => "employee search not cached",
            Self::ReadLeaderAssigned => "employee read set in progress",
            Self::ReadLeaderAlreadyAssigned => "employee read already in progress",
            Self::SearchLeaderAssigned => "employee search set in progress",
            Self::SearchLeaderAlreadyAssigned => "employee search already in progress",
        };
        write!(f, "{}", s)
    }
}

/// Errors surfaced by cache backends.
///
/// `Miss` carries the control signals of the single-flight protocol; the
/// remaining variants are genuine faults that stop the retry loop.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss: {0}")]
    Miss(MissKind),

    #[error("cache backend error: {message}")]
    Backend { message: String },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn miss(kind: MissKind) -> Self {
        Self::Miss(kind)
    }

    /// The miss kind, when this error is a control signal
    pub fn miss_kind(&self) -> Option<MissKind> {
        match self {
            Self::Miss(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Two-tier employee cache with optional single-flight coordination.
///
/// Implementations keep a per-record tier (`emp_no → record`) and a
/// per-search tier (`fingerprint → ordered id list`). The per-search tier is
/// not self-sufficient: a search hit whose referenced ids are not all
/// present in the per-record tier is reported as a miss and the stale entry
/// is dropped.
#[async_trait]
pub trait EmployeeCache: Send + Sync + Debug {
    /// Reads a single employee from the per-record tier
    async fn read_one(&self, emp_no: i64) -> Result<Employee, CacheError>;

    /// Resolves a search through the per-search tier
    async fn read_many(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, CacheError>;

    /// Publishes records into the per-record tier and the id list into the
    /// per-search tier, clearing any covering in-progress entries
    async fn write_many(
        &self,
        search: &EmployeeSearch,
        employees: &[Employee],
    ) -> Result<(), CacheError>;

    /// Evicts ids from the per-record tier and their in-progress entries.
    /// Per-search entries self-invalidate on the next read.
    async fn delete(&self, emp_nos: &[i64]) -> Result<(), CacheError>;

    /// Wipes every tier and the in-progress registry
    async fn clear(&self) -> Result<(), CacheError>;

    /// Stops background tasks and releases connections; idempotent
    async fn close(&self) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_miss_kinds() {
        assert!(MissKind::NotCached.should_retry());
        assert!(MissKind::SearchNotCached.should_retry());
        assert!(MissKind::ReadLeaderAlreadyAssigned.should_retry());
        assert!(MissKind::SearchLeaderAlreadyAssigned.should_retry());
        assert!(!MissKind::ReadLeaderAssigned.should_retry());
        assert!(!MissKind::SearchLeaderAssigned.should_retry());
    }

    #[test]
    fn test_leader_kinds() {
        assert!(MissKind::ReadLeaderAssigned.is_leader_assigned());
        assert!(MissKind::SearchLeaderAssigned.is_leader_assigned());
        assert!(!MissKind::NotCached.is_leader_assigned());
        assert!(!MissKind::ReadLeaderAlreadyAssigned.is_leader_assigned());
    }

    #[test]
    fn test_miss_kind_accessor() {
        let miss = CacheError::miss(MissKind::NotCached);
        assert_eq!(miss.miss_kind(), Some(MissKind::NotCached));

        let fault = CacheError::backend("connection reset");
        assert_eq!(fault.miss_kind(), None);
    }
}
