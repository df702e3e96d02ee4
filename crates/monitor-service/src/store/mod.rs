//! Durable persistence for alerts, the audit trail, and analytics rollups.
//!
//! Two implementations: [`MemoryAlertStore`] for development and tests, and
//! [`PgAlertStore`] backed by Postgres. Writes are append or mutate-by-id
//! only; nothing is ever deleted in normal operation.

pub mod memory;
pub mod postgres;

pub use memory::MemoryAlertStore;
pub use postgres::PgAlertStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::alerts::{Alert, EventLogEntry, EventType, Severity};
use common::analytics::AnalyticsSnapshot;

/// Hard cap on rows returned by any single query.
pub const MAX_QUERY_LIMIT: u32 = 500;

const DEFAULT_ALERT_LIMIT: u32 = 50;
const DEFAULT_EVENT_LOG_LIMIT: u32 = 100;

/// Outcome of a resolve that found the alert.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAlert {
    /// This call transitioned the alert to resolved
    Updated(Alert),
    /// The alert was already resolved; returned unchanged
    AlreadyResolved(Alert),
}

impl ResolvedAlert {
    pub fn alert(&self) -> &Alert {
        match self {
            ResolvedAlert::Updated(alert) => alert,
            ResolvedAlert::AlreadyResolved(alert) => alert,
        }
    }

    pub fn into_alert(self) -> Alert {
        match self {
            ResolvedAlert::Updated(alert) => alert,
            ResolvedAlert::AlreadyResolved(alert) => alert,
        }
    }

    pub fn was_updated(&self) -> bool {
        matches!(self, ResolvedAlert::Updated(_))
    }
}

/// Filters and pagination for alert queries.
#[derive(Debug, Clone)]
pub struct AlertQuery {
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub location: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// 1-based page index
    pub page: u32,
    pub limit: u32,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            severity: None,
            resolved: None,
            location: None,
            since: None,
            until: None,
            page: 1,
            limit: DEFAULT_ALERT_LIMIT,
        }
    }
}

impl AlertQuery {
    pub fn normalized_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_ALERT_LIMIT
        } else {
            self.limit.min(MAX_QUERY_LIMIT)
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page.max(1) - 1) * self.normalized_limit()
    }
}

/// Filters and pagination for event log queries.
#[derive(Debug, Clone)]
pub struct EventLogQuery {
    pub event_type: Option<EventType>,
    pub location: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// 1-based page index
    pub page: u32,
    pub limit: u32,
}

impl Default for EventLogQuery {
    fn default() -> Self {
        Self {
            event_type: None,
            location: None,
            since: None,
            until: None,
            page: 1,
            limit: DEFAULT_EVENT_LOG_LIMIT,
        }
    }
}

impl EventLogQuery {
    pub fn normalized_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_EVENT_LOG_LIMIT
        } else {
            self.limit.min(MAX_QUERY_LIMIT)
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page.max(1) - 1) * self.normalized_limit()
    }
}

/// Storage backend for the monitoring engine.
///
/// Implementations enforce the record invariants before every write and keep
/// `resolve_alert` atomic: a compare-and-set on `resolved` decides between a
/// fresh resolution and an idempotent no-op, so a manual resolve racing the
/// engine's auto-resolve can never double-apply.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a newly created alert. Fails on duplicate id or on a record
    /// that violates the schema invariants.
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    /// Atomically mark an alert resolved. Returns `None` when no alert with
    /// this id exists; `AlreadyResolved` keeps the original resolution
    /// untouched.
    async fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<ResolvedAlert>>;

    /// Append one audit-trail entry.
    async fn append_event_log(&self, entry: &EventLogEntry) -> Result<()>;

    /// Append one analytics rollup.
    async fn append_analytics(&self, snapshot: &AnalyticsSnapshot) -> Result<()>;

    /// Alerts matching the filter, newest first. No matches is an empty
    /// vector, not an error.
    async fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>>;

    /// Event log entries matching the filter, newest first.
    async fn query_event_logs(&self, query: &EventLogQuery) -> Result<Vec<EventLogEntry>>;

    /// Snapshots taken at or after `since`, newest first.
    async fn analytics_history(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AnalyticsSnapshot>>;

    /// Number of unresolved alerts across all locations.
    async fn count_active_alerts(&self) -> Result<u64>;

    /// Cheap backend liveness probe for readiness checks.
    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_offset_follows_page_and_limit() {
        let query = AlertQuery {
            page: 3,
            limit: 20,
            ..AlertQuery::default()
        };
        assert_eq!(query.normalized_limit(), 20);
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn zero_and_oversized_limits_are_normalized() {
        let zero = AlertQuery {
            limit: 0,
            ..AlertQuery::default()
        };
        assert_eq!(zero.normalized_limit(), 50);

        let oversized = EventLogQuery {
            limit: 10_000,
            ..EventLogQuery::default()
        };
        assert_eq!(oversized.normalized_limit(), MAX_QUERY_LIMIT);
    }

    #[test]
    fn page_zero_behaves_like_page_one() {
        let query = EventLogQuery {
            page: 0,
            ..EventLogQuery::default()
        };
        assert_eq!(query.offset(), 0);
    }
}
