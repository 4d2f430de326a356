//! Per-domain audit log store: a single mutual-exclusion region guarding the
//! in-memory map and the file write (spec.md §4.A, §5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mailcert_types::prelude::*;
use parking_lot::Mutex;

use crate::types::{AuditEntry, AuditLog, AuditLogSummary, Level, LogStatus};

/// Replaces characters unsafe in a filename with `_` (spec.md §4.A, §6).
pub fn sanitize_name(name: &str) -> String {
	name.chars()
		.map(|c| if "/\\:*?\"<>|".contains(c) { '_' } else { c })
		.collect()
}

/// Append-only per-domain audit journal, file-backed under `log_dir`
/// (spec.md §4.A). Structured the way the teacher guards single-mutex
/// shared maps (`AppState::acme_challenge_map: RwLock<HashMap<...>>`),
/// generalized to a `parking_lot::Mutex` since every access here mutates.
///
/// The in-memory map is guarded synchronously, but disk writes need to
/// `.await`, so they run behind a second, async `writer` mutex — a
/// single-writer gate that serializes every flush so on-disk write order
/// matches the order entries were appended in-memory (spec.md §5).
pub struct AuditLogStore {
	logs: Mutex<HashMap<Box<str>, AuditLog>>,
	writer: tokio::sync::Mutex<()>,
	log_dir: Box<Path>,
}

impl std::fmt::Debug for AuditLogStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AuditLogStore").field("log_dir", &self.log_dir).finish_non_exhaustive()
	}
}

impl AuditLogStore {
	pub fn new(log_dir: impl Into<Box<Path>>) -> Self {
		Self { logs: Mutex::new(HashMap::new()), writer: tokio::sync::Mutex::new(()), log_dir: log_dir.into() }
	}

	fn file_path(&self, domain_name: &str) -> PathBuf {
		self.log_dir.join(format!("{}.json", sanitize_name(domain_name)))
	}

	/// Starts (or restarts) a domain's log as `in_progress`.
	pub async fn start_domain_log(&self, domain_name: &str) {
		let now = Timestamp::now();
		let snapshot = {
			let mut logs = self.logs.lock();
			let log = AuditLog::start(domain_name, now);
			logs.insert(domain_name.into(), log.clone());
			log
		};
		self.flush(&snapshot).await;
	}

	/// Appends an entry and bumps `updated_at` (spec.md §4.A / §3 invariant:
	/// "every write updates `updated_at` and is flushed to the backing file
	/// before returning").
	pub async fn log(
		&self,
		domain_name: &str,
		level: Level,
		step: &str,
		message: &str,
		details: Option<serde_json::Value>,
	) {
		let now = Timestamp::now();
		let snapshot = {
			let mut logs = self.logs.lock();
			let log = logs
				.entry(domain_name.into())
				.or_insert_with(|| AuditLog::start(domain_name, now));
			log.entries.push(AuditEntry {
				timestamp: now,
				level,
				step: step.into(),
				message: message.into(),
				details,
				duration_ms: None,
				error_code: None,
				request_id: None,
			});
			log.updated_at = now;
			log.clone()
		};
		self.flush(&snapshot).await;
	}

	pub async fn info(&self, domain_name: &str, step: &str, message: &str) {
		self.log(domain_name, Level::Info, step, message, None).await;
	}

	pub async fn warning(&self, domain_name: &str, step: &str, message: &str) {
		self.log(domain_name, Level::Warning, step, message, None).await;
	}

	pub async fn error(&self, domain_name: &str, step: &str, message: &str) {
		self.log(domain_name, Level::Error, step, message, None).await;
	}

	pub async fn debug(&self, domain_name: &str, step: &str, message: &str) {
		self.log(domain_name, Level::Debug, step, message, None).await;
	}

	/// Sets the overall log status without appending an entry.
	pub async fn set_status(&self, domain_name: &str, status: LogStatus) {
		let now = Timestamp::now();
		let snapshot = {
			let mut logs = self.logs.lock();
			let log = logs
				.entry(domain_name.into())
				.or_insert_with(|| AuditLog::start(domain_name, now));
			log.status = status;
			log.updated_at = now;
			log.clone()
		};
		self.flush(&snapshot).await;
	}

	pub async fn mark_success(&self, domain_name: &str) {
		self.set_status(domain_name, LogStatus::Success).await;
	}

	pub async fn mark_failed(&self, domain_name: &str, err: &str) {
		self.log(domain_name, Level::Error, "failed", err, None).await;
		self.set_status(domain_name, LogStatus::Failed).await;
	}

	/// Returns a domain's log, loading it from the backing file if it is
	/// not already in memory.
	pub async fn get_domain_log(&self, domain_name: &str) -> Option<AuditLog> {
		if let Some(log) = self.logs.lock().get(domain_name).cloned() {
			return Some(log);
		}
		let path = self.file_path(domain_name);
		let bytes = tokio::fs::read(&path).await.ok()?;
		let log: AuditLog = serde_json::from_slice(&bytes).ok()?;
		self.logs.lock().insert(domain_name.into(), log.clone());
		Some(log)
	}

	/// Summaries of every domain log, including ones not yet loaded into
	/// memory (first boot / restart after a crash).
	pub async fn list_all_summaries(&self) -> Vec<AuditLogSummary> {
		let mut summaries: HashMap<String, AuditLogSummary> = self
			.logs
			.lock()
			.values()
			.map(|log| (log.domain_name.to_string(), log.summarize()))
			.collect();

		if let Ok(mut dir) = tokio::fs::read_dir(&self.log_dir).await {
			while let Ok(Some(entry)) = dir.next_entry().await {
				let path = entry.path();
				if path.extension().and_then(|e| e.to_str()) != Some("json") {
					continue;
				}
				let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
				if summaries.contains_key(stem) {
					continue;
				}
				if let Ok(bytes) = tokio::fs::read(&path).await {
					if let Ok(log) = serde_json::from_slice::<AuditLog>(&bytes) {
						summaries.insert(stem.to_string(), log.summarize());
					}
				}
			}
		}

		summaries.into_values().collect()
	}

	/// Writes the full log as pretty JSON. Write failures are swallowed —
	/// the core must not fail because the audit file is unwritable
	/// (spec.md §4.A) — but are still reported via `tracing::warn!`. Holds
	/// `writer` for the duration so concurrent flushes for any domain land
	/// on disk in the same order they were queued.
	async fn flush(&self, log: &AuditLog) {
		let _serialize = self.writer.lock().await;
		if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
			warn!(domain = %log.domain_name, error = %e, "failed to create audit log directory");
			return;
		}
		let bytes = match serde_json::to_vec_pretty(log) {
			Ok(b) => b,
			Err(e) => {
				warn!(domain = %log.domain_name, error = %e, "failed to serialize audit log");
				return;
			}
		};
		if let Err(e) = tokio::fs::write(self.file_path(&log.domain_name), bytes).await {
			warn!(domain = %log.domain_name, error = %e, "failed to write audit log file");
		}
	}
}

// vim: ts=4
