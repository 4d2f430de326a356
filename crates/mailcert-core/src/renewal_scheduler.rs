//! Renewal Scheduler (component H, spec.md §4.H): a background actor that
//! periodically scans for certificates due for renewal.
//!
//! Grounded on the lighter `tokio::sync::{mpsc, RwLock}` + `tokio::select!`
//! shutdown-channel shape used for the teacher's worker/broadcast actors
//! (`cloudillo_types::worker::WorkerPool`'s per-queue signaling,
//! `ws_broadcast`'s `RwLock`-guarded registry), not the persistence-backed
//! cron `Scheduler`/`Task` machinery in `cloudillo-core::scheduler` — that
//! subsystem is keyed by cron expressions and dependency graphs, more than
//! a single periodic scan needs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mailcert_types::prelude::*;
use tokio::sync::{mpsc, oneshot};

use crate::CertificateManager;

/// Defaults from spec.md §4.H.
#[derive(Clone, Debug)]
pub struct RenewalSchedulerConfig {
	/// Interval between scans. Default 24h.
	pub check_interval: Duration,
	/// Certificates expiring within this many days are renewed. Default 30.
	pub renewal_days: u32,
	/// Hard deadline for a single scan. Default 5 minutes.
	pub scan_deadline: Duration,
}

impl Default for RenewalSchedulerConfig {
	fn default() -> Self {
		Self { check_interval: Duration::from_secs(24 * 3600), renewal_days: 30, scan_deadline: Duration::from_secs(5 * 60) }
	}
}

enum Command {
	ForceCheck,
	Stop(oneshot::Sender<()>),
}

/// Handle to the running scheduler loop. `Start` returns one of these;
/// dropping it does not stop the loop — call `stop()` explicitly (spec.md
/// §4.H `Stop` "signals shutdown via a channel and waits for the loop to
/// drain").
pub struct RenewalSchedulerHandle {
	commands: mpsc::Sender<Command>,
	running: Arc<AtomicBool>,
	task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for RenewalSchedulerHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RenewalSchedulerHandle").field("running", &self.is_running()).finish_non_exhaustive()
	}
}

impl RenewalSchedulerHandle {
	/// `Start` (spec.md §4.H): runs an immediate check, then ticks every
	/// `check_interval`. Idempotent in the sense that a caller holding an
	/// already-started handle should not call this again; callers that need
	/// idempotent `Start` semantics across restarts should check
	/// `is_running()` first.
	pub fn start(manager: Arc<CertificateManager>, config: RenewalSchedulerConfig) -> Self {
		let (tx, rx) = mpsc::channel(8);
		let running = Arc::new(AtomicBool::new(true));
		let task = tokio::spawn(run_loop(manager, config, rx, Arc::clone(&running)));
		Self { commands: tx, running, task }
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	/// `ForceCheck` (spec.md §4.H): spawns a concurrent check only while
	/// running.
	pub async fn force_check(&self) -> ClResult<()> {
		if !self.is_running() {
			return Err(Error::StateError("cannot ForceCheck: scheduler is not running".into()));
		}
		self.commands.send(Command::ForceCheck).await.map_err(|_| Error::StateError("scheduler loop has already stopped".into()))
	}

	/// `Stop` (spec.md §4.H): signals shutdown and waits for the loop to
	/// drain.
	pub async fn stop(self) -> ClResult<()> {
		let (done_tx, done_rx) = oneshot::channel();
		if self.commands.send(Command::Stop(done_tx)).await.is_ok() {
			let _ = done_rx.await;
		}
		self.task.await.map_err(Error::from)
	}
}

async fn run_loop(
	manager: Arc<CertificateManager>,
	config: RenewalSchedulerConfig,
	mut commands: mpsc::Receiver<Command>,
	running: Arc<AtomicBool>,
) {
	scan_once(Arc::clone(&manager), config.clone()).await;

	let mut interval = tokio::time::interval(config.check_interval);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	interval.tick().await; // the first tick fires immediately; the scan above already covered it

	loop {
		tokio::select! {
			_ = interval.tick() => {
				scan_once(Arc::clone(&manager), config.clone()).await;
			}
			cmd = commands.recv() => {
				match cmd {
					Some(Command::ForceCheck) => {
						// Spawned rather than awaited in place: ForceCheck must run
						// concurrently with the loop, not block interval ticks or
						// a pending Stop for up to scan_deadline (spec.md §4.H).
						tokio::spawn(scan_once(Arc::clone(&manager), config.clone()));
					}
					Some(Command::Stop(done)) => {
						running.store(false, Ordering::Release);
						let _ = done.send(());
						return;
					}
					None => {
						running.store(false, Ordering::Release);
						return;
					}
				}
			}
		}
	}
}

/// A single scan: expiring certificates with `auto_renew=true` are renewed
/// one at a time under a shared 5-minute deadline; a single certificate's
/// failure is logged and does not interrupt the scan (spec.md §4.H). Takes
/// owned arguments so a forced check can run as its own spawned task
/// alongside the loop rather than block it.
async fn scan_once(manager: Arc<CertificateManager>, config: RenewalSchedulerConfig) {
	let deadline = tokio::time::timeout(config.scan_deadline, scan_body(&manager, &config)).await;
	if deadline.is_err() {
		warn!(deadline_secs = config.scan_deadline.as_secs(), "renewal scan exceeded its deadline and was aborted mid-scan");
	}
}

async fn scan_body(manager: &CertificateManager, config: &RenewalSchedulerConfig) {
	let expiring = match manager.get_expiring_certificates(config.renewal_days).await {
		Ok(rows) => rows,
		Err(e) => {
			warn!(error = %e, "renewal scan failed to list expiring certificates");
			return;
		}
	};

	for cert in expiring {
		if !cert.auto_renew {
			continue;
		}
		if let Err(e) = manager.renew_certificate(cert.domain_id).await {
			warn!(domain = %cert.domain_name, error = %e, "renewal scan failed to renew certificate, continuing scan");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::in_memory::{InMemoryCertificateRepository, InMemoryDomainRepository};
	use mailcert_acme::{AcmeDriver, AcmeDriverConfig};
	use mailcert_audit::AuditLogStore;
	use mailcert_dns::{DnsVerifier, DnsVerifierConfig};
	use mailcert_storage::CertificateStorage;
	use mailcert_types::{CertificateRepository, DomainRepository};
	use tempfile::tempdir;

	fn manager() -> Arc<CertificateManager> {
		let domains: Arc<dyn DomainRepository> = InMemoryDomainRepository::new();
		let certificates: Arc<dyn CertificateRepository> = InMemoryCertificateRepository::new();
		let acme = Arc::new(AcmeDriver::new(AcmeDriverConfig::staging(vec![])));
		let dns = Arc::new(DnsVerifier::new(DnsVerifierConfig::default()).expect("dns verifier"));
		let dir = tempdir().expect("tempdir");
		let storage = Arc::new(CertificateStorage::new(dir.path().join("certs").into_boxed_path()));
		let audit = Arc::new(AuditLogStore::new(dir.path().join("audit").into_boxed_path()));
		Arc::new(CertificateManager::new(domains, certificates, acme, dns, storage, audit))
	}

	#[tokio::test(start_paused = true)]
	async fn start_runs_an_immediate_check_and_reports_running() {
		let handle = RenewalSchedulerHandle::start(manager(), RenewalSchedulerConfig::default());
		assert!(handle.is_running());
		handle.stop().await.expect("stop drains cleanly");
	}

	#[tokio::test(start_paused = true)]
	async fn force_check_succeeds_while_running_and_fails_once_marked_stopped() {
		let handle = RenewalSchedulerHandle::start(manager(), RenewalSchedulerConfig::default());
		handle.force_check().await.expect("running, force check accepted");

		handle.running.store(false, Ordering::Release);
		let err = handle.force_check().await.expect_err("marked stopped, force check rejected");
		assert!(matches!(err, Error::StateError(_)));

		handle.running.store(true, Ordering::Release);
		handle.stop().await.expect("stop drains cleanly");
	}
}

// vim: ts=4
