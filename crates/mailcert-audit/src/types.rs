//! Audit log data model (spec.md §3 AuditLog, §4.A).

use serde::{Deserialize, Serialize};

use mailcert_types::Timestamp;

/// Severity of an audit log entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
	Info,
	Warning,
	Error,
	Debug,
}

/// Overall progress of a domain's onboarding, surfaced to the user-facing
/// progress UI (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
	InProgress,
	Success,
	Failed,
}

/// A single append-only audit entry (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
	pub timestamp: Timestamp,
	pub level: Level,
	pub step: Box<str>,
	pub message: Box<str>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Duration of the step in milliseconds, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_code: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<Box<str>>,
}

/// Full per-domain audit log, persisted as pretty JSON (spec.md §3, §4.A).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLog {
	pub domain_name: Box<str>,
	pub status: LogStatus,
	pub started_at: Timestamp,
	pub updated_at: Timestamp,
	pub entries: Vec<AuditEntry>,
}

impl AuditLog {
	pub fn start(domain_name: &str, now: Timestamp) -> Self {
		Self {
			domain_name: domain_name.into(),
			status: LogStatus::InProgress,
			started_at: now,
			updated_at: now,
			entries: Vec::new(),
		}
	}

	pub fn summarize(&self) -> AuditLogSummary {
		AuditLogSummary {
			domain_name: self.domain_name.clone(),
			status: self.status,
			started_at: self.started_at,
			updated_at: self.updated_at,
			entry_count: self.entries.len(),
		}
	}
}

/// Summary row returned by `ListAllSummaries` (spec.md §4.A).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogSummary {
	pub domain_name: Box<str>,
	pub status: LogStatus,
	pub started_at: Timestamp,
	pub updated_at: Timestamp,
	pub entry_count: usize,
}

// vim: ts=4
