//! RFC 8555 ACME driver (component D, spec.md §4.D): persisted account key,
//! lazy registration, DNS-01 challenges and certificate finalization.
//!
//! Grounded on `cloudillo-core::acme` (`Account::builder()?.create(...)`,
//! `order.authorizations()` stream, `challenge.set_ready()`,
//! `order.poll_ready(&RetryPolicy)`), switched from `Http01` to `Dns01` and
//! from the teacher's auto-generated finalize key to an explicit `rcgen`
//! key/CSR per spec.md §4.D `RequestCertificate`. The `orders`/`challenges`
//! maps are guarded by `parking_lot::Mutex` from the start (spec.md §9 flags
//! the teacher's unguarded maps as a defect, not a feature to preserve).

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod account;
mod certificate;
mod challenge;

pub use account::AcmeCredentials;
pub use certificate::IssuedCertificate;
pub use challenge::DnsChallenge;

use account::RegisteredAccount;

use std::collections::HashMap;
use std::time::Duration;

use instant_acme::{Account, LetsEncrypt, Order};
use mailcert_types::prelude::*;
use parking_lot::Mutex;

/// Lower bound enforced on the configured propagation delay (spec.md §9
/// design note: expose the teacher's fixed 90s sleep as configuration with a
/// floor so operators can't configure a delay too short to ever propagate).
pub const MIN_PROPAGATION_DELAY: Duration = Duration::from_secs(30);

/// Interval and ceiling for the post-challenge authorization poll
/// (spec.md §4.D `CompleteDNSChallenge`).
pub const AUTHORIZATION_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const AUTHORIZATION_POLL_CEILING: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
pub struct AcmeDriverConfig {
	pub directory_url: Box<str>,
	/// Contact addresses passed to `NewAccount` (e.g. `mailto:ops@example.com`).
	pub contact: Vec<Box<str>>,
	/// Propagation wait in `CompleteDNSChallenge`, clamped to
	/// `>= MIN_PROPAGATION_DELAY`.
	pub propagation_delay: Duration,
}

impl AcmeDriverConfig {
	pub fn production(contact: Vec<Box<str>>) -> Self {
		Self { directory_url: LetsEncrypt::Production.url().into(), contact, propagation_delay: Duration::from_secs(90) }
	}

	pub fn staging(contact: Vec<Box<str>>) -> Self {
		Self { directory_url: LetsEncrypt::Staging.url().into(), contact, propagation_delay: Duration::from_secs(90) }
	}

	fn effective_propagation_delay(&self) -> Duration {
		self.propagation_delay.max(MIN_PROPAGATION_DELAY)
	}
}

/// An order together with the challenge details we derived from it, kept
/// alive between `GetDNSChallenge` and `CompleteDNSChallenge`/
/// `RequestCertificate` (spec.md §4.D "in-flight orders[domain] and
/// challenges[domain]").
struct InFlightOrder {
	order: Order,
	challenge: DnsChallenge,
}

/// The ACME driver. One instance per directory URL; cheap to share behind
/// an `Arc` since all mutable state lives behind `parking_lot::Mutex`/an
/// async-aware account slot.
pub struct AcmeDriver {
	config: AcmeDriverConfig,
	account: tokio::sync::RwLock<Option<RegisteredAccount>>,
	/// Captured at registration time so `GetAccountKey` has something to
	/// return; `None` when the driver was restored via `from_credentials`
	/// (the caller already holds the key in that case).
	credentials: tokio::sync::RwLock<Option<AcmeCredentials>>,
	orders: Mutex<HashMap<Box<str>, InFlightOrder>>,
}

impl std::fmt::Debug for AcmeDriver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AcmeDriver")
			.field("directory_url", &self.config.directory_url)
			.field("registered", &self.account.try_read().is_ok_and(|a| a.is_some()))
			.field("in_flight", &self.orders.lock().len())
			.finish()
	}
}

impl AcmeDriver {
	pub fn new(config: AcmeDriverConfig) -> Self {
		Self {
			config,
			account: tokio::sync::RwLock::new(None),
			credentials: tokio::sync::RwLock::new(None),
			orders: Mutex::new(HashMap::new()),
		}
	}

	/// Restores a driver from a previously persisted account key, skipping
	/// registration. The spec treats the account key as the caller's to
	/// persist (spec.md §9 Open Question 2); this is the matching restore
	/// path.
	pub async fn from_credentials(config: AcmeDriverConfig, credentials: AcmeCredentials) -> ClResult<Self> {
		let account = Account::from_credentials(credentials.0.clone()).await?;
		let driver = Self::new(config);
		*driver.account.write().await = Some(RegisteredAccount(account));
		*driver.credentials.write().await = Some(credentials);
		Ok(driver)
	}

	pub(crate) fn directory_url(&self) -> &str {
		&self.config.directory_url
	}

	pub(crate) fn propagation_delay(&self) -> Duration {
		self.config.effective_propagation_delay()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn propagation_delay_is_clamped_to_the_configured_floor() {
		let mut config = AcmeDriverConfig::production(vec!["mailto:ops@example.com".into()]);
		config.propagation_delay = Duration::from_secs(5);
		assert_eq!(config.effective_propagation_delay(), MIN_PROPAGATION_DELAY);

		config.propagation_delay = Duration::from_secs(120);
		assert_eq!(config.effective_propagation_delay(), Duration::from_secs(120));
	}

	#[test]
	fn production_and_staging_use_distinct_directory_urls() {
		let production = AcmeDriverConfig::production(vec![]);
		let staging = AcmeDriverConfig::staging(vec![]);
		assert_ne!(production.directory_url, staging.directory_url);
	}

	#[tokio::test]
	async fn account_key_fails_before_registration() {
		let driver = AcmeDriver::new(AcmeDriverConfig::staging(vec![]));
		assert!(driver.account_key().await.is_err());
	}

	#[tokio::test]
	async fn request_certificate_fails_without_a_prior_challenge() {
		let driver = AcmeDriver::new(AcmeDriverConfig::staging(vec![]));
		let result = driver.request_certificate(&["example.com".into()]).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn complete_dns_challenge_fails_without_a_prior_challenge() {
		let driver = AcmeDriver::new(AcmeDriverConfig::staging(vec![]));
		let cancel = tokio_util::sync::CancellationToken::new();
		let result = driver.complete_dns_challenge("example.com", &cancel).await;
		assert!(result.is_err());
	}
}

// vim: ts=4
