//! In-memory SNI certificate table with hot reload and subscriber
//! notification (component E, spec.md §4.E). Near-verbatim the teacher's
//! `AppState.certs: RwLock<HashMap<Box<str>, Arc<CertifiedKey>>>` plus
//! `cloudillo-proxy::build_certified_key`/`reload_proxy_cache`, extended
//! with a default-certificate slot and a subscriber list.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;

use mailcert_storage::CertificateStorage;
use mailcert_types::prelude::*;
use mailcert_types::{CertificateRepository, ReloadCallback};
use parking_lot::RwLock;
use rustls::sign::CertifiedKey;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// Everything after the first dot: the (flagged-as-possibly-unintentional)
/// SNI parent-domain fallback match (spec.md §9 Open Question 1). Preserved
/// verbatim as observed in the source rather than "fixed" to a registrable-
/// domain parse.
// FIXME: this returns the TLD for a bare apex ("example.com" → "com"), which
// would accept any certificate registered under the same TLD as a parent
// match. Unclear whether intentional; preserved per spec.md §9.
fn sni_parent_domain(name: &str) -> &str {
	match name.split_once('.') {
		Some((_, rest)) => rest,
		None => name,
	}
}

fn mail_hostname(name: &str) -> String {
	if name.starts_with("mail.") {
		name.to_string()
	} else {
		format!("mail.{name}")
	}
}

fn build_certified_key(fullchain_pem: &str, key_pem: &str) -> ClResult<CertifiedKey> {
	let certs: Vec<CertificateDer<'static>> =
		CertificateDer::pem_slice_iter(fullchain_pem.as_bytes()).filter_map(Result::ok).collect();
	if certs.is_empty() {
		return Err(Error::CryptoError("no certificates found in PEM bundle".into()));
	}
	let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())?;
	let provider = rustls::crypto::CryptoProvider::get_default()
		.ok_or_else(|| Error::CryptoError("no default rustls crypto provider installed".into()))?;
	CertifiedKey::from_der(certs, key, provider).map_err(Error::from)
}

/// The certificate store: an in-memory SNI map, a default certificate slot,
/// and a list of reload subscribers.
pub struct CertificateStore {
	certs: RwLock<HashMap<Box<str>, Arc<CertifiedKey>>>,
	default: RwLock<Option<Arc<CertifiedKey>>>,
	subscribers: RwLock<Vec<ReloadCallback>>,
	storage: Arc<CertificateStorage>,
}

impl std::fmt::Debug for CertificateStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CertificateStore")
			.field("entries", &self.certs.read().len())
			.field("has_default", &self.default.read().is_some())
			.field("subscribers", &self.subscribers.read().len())
			.finish()
	}
}

impl CertificateStore {
	pub fn new(storage: Arc<CertificateStorage>) -> Self {
		Self {
			certs: RwLock::new(HashMap::new()),
			default: RwLock::new(None),
			subscribers: RwLock::new(Vec::new()),
			storage,
		}
	}

	pub fn add_certificate(&self, name: &str, cert: Arc<CertifiedKey>) {
		self.certs.write().insert(name.into(), cert);
	}

	pub fn remove_certificate(&self, name: &str) {
		self.certs.write().remove(name);
	}

	pub fn set_default_certificate(&self, cert: Arc<CertifiedKey>) {
		*self.default.write() = Some(cert);
	}

	/// Exact map lookup.
	pub fn get_certificate(&self, name: &str) -> Option<Arc<CertifiedKey>> {
		self.certs.read().get(name).cloned()
	}

	/// Returns a selector closure suitable for a TLS listener's SNI
	/// resolver: exact match, then parent-domain match, then the default
	/// certificate, then failure (spec.md §4.E). An empty SNI falls
	/// straight through to the default.
	pub fn get_certificate_func(self: &Arc<Self>) -> impl Fn(&str) -> Option<Arc<CertifiedKey>> {
		let store = Arc::clone(self);
		move |sni: &str| {
			if sni.is_empty() {
				return store.default.read().clone();
			}
			if let Some(cert) = store.certs.read().get(sni).cloned() {
				return Some(cert);
			}
			let parent = sni_parent_domain(sni);
			if let Some(cert) = store.certs.read().get(parent).cloned() {
				return Some(cert);
			}
			store.default.read().clone()
		}
	}

	/// Loads PEM from storage and builds a `CertifiedKey`, without
	/// inserting it into the map. Fails if the files are missing.
	pub async fn load_certificate(&self, name: &str) -> ClResult<Arc<CertifiedKey>> {
		let stored = self.storage.load_certificate(name).await?;
		let key = build_certified_key(&stored.fullchain_pem, &stored.key_pem)?;
		Ok(Arc::new(key))
	}

	/// Loads a certificate and installs it under both `name` and
	/// `mail.<name>`, then invokes every registered subscriber — used for
	/// hot reload immediately after issuance (spec.md §4.E, §4.G).
	pub async fn load_and_add_certificate(&self, name: &str) -> ClResult<()> {
		let cert = self.load_certificate(name).await?;
		self.certs.write().insert(name.into(), cert.clone());
		self.certs.write().insert(mail_hostname(name).into_boxed_str(), cert);
		self.notify_subscribers(name);
		Ok(())
	}

	/// Reloads every persisted certificate row, double-entering `mail.<name>`
	/// for each, and atomically swaps the result in. Certificates that fail
	/// to load are skipped — a single bad leaf never aborts the reload
	/// (spec.md §4.E).
	pub async fn reload_all(&self, repository: &dyn CertificateRepository) -> ClResult<()> {
		let rows = repository.list().await?;
		let mut fresh = HashMap::with_capacity(rows.len() * 2);
		for row in rows {
			match self.load_certificate(&row.domain_name).await {
				Ok(cert) => {
					fresh.insert(row.domain_name.clone(), cert.clone());
					fresh.insert(mail_hostname(&row.domain_name).into_boxed_str(), cert);
				}
				Err(e) => {
					warn!(domain = %row.domain_name, error = %e, "skipping certificate that failed to load during reload");
				}
			}
		}
		let changed: Vec<Box<str>> = fresh.keys().cloned().collect();
		*self.certs.write() = fresh;
		for name in &changed {
			self.notify_subscribers(name);
		}
		Ok(())
	}

	pub fn register_reload_callback(&self, callback: ReloadCallback) {
		self.subscribers.write().push(callback);
	}

	/// Invokes subscribers outside the critical section against a private
	/// copy of the subscriber slice, avoiding re-entrant deadlocks if a
	/// subscriber calls back into the store (spec.md §4.E, §5).
	fn notify_subscribers(&self, name: &str) {
		let subscribers = self.subscribers.read().clone();
		for callback in &subscribers {
			callback(name);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sni_parent_domain_matches_observed_behavior() {
		assert_eq!(sni_parent_domain("mail.example.com"), "example.com");
		assert_eq!(sni_parent_domain("example.com"), "com");
	}

	#[test]
	fn mail_hostname_is_idempotent() {
		assert_eq!(mail_hostname("example.com"), "mail.example.com");
		assert_eq!(mail_hostname("mail.example.com"), "mail.example.com");
	}
}

// vim: ts=4
