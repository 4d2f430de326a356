//! Reference in-memory implementations of [`DomainRepository`] and
//! [`CertificateRepository`], grounded on `cloudillo_core::scheduler::
//! InMemoryTaskStore` (a `Mutex`-guarded counter plus no-op persistence):
//! here the "no-op persistence" becomes a real `HashMap`, since unlike the
//! task store this is meant to be usable standalone for tests and small
//! deployments rather than purely a null object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mailcert_types::prelude::*;
use mailcert_types::{CertificateRepository, Domain, DomainCertificate, DomainPatch, DomainRepository};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct DomainTable {
	next_id: u64,
	by_id: HashMap<u64, Domain>,
}

/// In-memory [`DomainRepository`]. Unique on `name`; `get`/`update`/`delete`
/// fail with [`Error::NotFound`] for unknown ids.
#[derive(Debug, Default)]
pub struct InMemoryDomainRepository {
	table: Mutex<DomainTable>,
}

impl InMemoryDomainRepository {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}
}

#[async_trait]
impl DomainRepository for InMemoryDomainRepository {
	async fn create(&self, name: &str, dns_challenge: &str) -> ClResult<Domain> {
		let mut table = self.table.lock();
		if table.by_id.values().any(|d| d.name.as_ref() == name) {
			return Err(Error::Conflict(format!("domain {name} already exists")));
		}
		table.next_id += 1;
		let id = DomainId(table.next_id);
		let now = Timestamp::now();
		let domain = Domain {
			id,
			name: name.into(),
			is_active: false,
			status: mailcert_types::DomainStatus::PendingDns,
			dns_challenge: dns_challenge.into(),
			error_message: None,
			acme_challenge: None,
			created_at: now,
			updated_at: now,
		};
		table.by_id.insert(id.0, domain.clone());
		Ok(domain)
	}

	async fn get(&self, id: DomainId) -> ClResult<Domain> {
		self.table.lock().by_id.get(&id.0).cloned().ok_or(Error::NotFound)
	}

	async fn get_by_name(&self, name: &str) -> ClResult<Domain> {
		self.table.lock().by_id.values().find(|d| d.name.as_ref() == name).cloned().ok_or(Error::NotFound)
	}

	async fn update(&self, id: DomainId, patch: DomainPatch) -> ClResult<Domain> {
		let mut table = self.table.lock();
		let domain = table.by_id.get_mut(&id.0).ok_or(Error::NotFound)?;
		if let Some(v) = patch.is_active.value() {
			domain.is_active = *v;
		}
		if let Some(v) = patch.status.value() {
			domain.status = *v;
		}
		match patch.dns_challenge {
			Patch::Value(v) => domain.dns_challenge = v,
			Patch::Null => domain.dns_challenge = "".into(),
			Patch::Undefined => {}
		}
		match patch.error_message {
			Patch::Value(v) => domain.error_message = Some(v),
			Patch::Null => domain.error_message = None,
			Patch::Undefined => {}
		}
		match patch.acme_challenge {
			Patch::Value(v) => domain.acme_challenge = Some(v),
			Patch::Null => domain.acme_challenge = None,
			Patch::Undefined => {}
		}
		domain.updated_at = Timestamp::now();
		Ok(domain.clone())
	}

	async fn delete(&self, id: DomainId) -> ClResult<()> {
		self.table.lock().by_id.remove(&id.0).ok_or(Error::NotFound)?;
		Ok(())
	}

	async fn list(&self) -> ClResult<Vec<Domain>> {
		Ok(self.table.lock().by_id.values().cloned().collect())
	}
}

/// In-memory [`CertificateRepository`]. Unique on `domain_id`; `upsert`
/// overwrites any existing row for the same domain (spec.md §3 "exactly one
/// row per domain").
#[derive(Debug, Default)]
pub struct InMemoryCertificateRepository {
	rows: Mutex<HashMap<u64, DomainCertificate>>,
}

impl InMemoryCertificateRepository {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}
}

#[async_trait]
impl CertificateRepository for InMemoryCertificateRepository {
	async fn upsert(&self, cert: &DomainCertificate) -> ClResult<()> {
		self.rows.lock().insert(cert.domain_id.0, cert.clone());
		Ok(())
	}

	async fn get_by_domain(&self, domain_id: DomainId) -> ClResult<DomainCertificate> {
		self.rows.lock().get(&domain_id.0).cloned().ok_or(Error::NotFound)
	}

	async fn delete(&self, domain_id: DomainId) -> ClResult<()> {
		self.rows.lock().remove(&domain_id.0).ok_or(Error::NotFound)?;
		Ok(())
	}

	async fn list(&self) -> ClResult<Vec<DomainCertificate>> {
		Ok(self.rows.lock().values().cloned().collect())
	}

	async fn get_expiring(&self, days: u32) -> ClResult<Vec<DomainCertificate>> {
		let now = Timestamp::now();
		let horizon = now.add_seconds(i64::from(days) * 86_400);
		let mut rows: Vec<DomainCertificate> =
			self.rows.lock().values().filter(|c| c.expires_at > now && c.expires_at <= horizon).cloned().collect();
		rows.sort_by_key(|c| c.expires_at);
		Ok(rows)
	}

	async fn get_all_with_auto_renew(&self) -> ClResult<Vec<DomainCertificate>> {
		Ok(self.rows.lock().values().filter(|c| c.auto_renew).cloned().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn create_rejects_duplicate_names() {
		let repo = InMemoryDomainRepository::new();
		repo.create("example.com", "a".repeat(32).as_str()).await.expect("first create succeeds");
		let err = repo.create("example.com", "b".repeat(32).as_str()).await.expect_err("duplicate rejected");
		assert!(matches!(err, Error::Conflict(_)));
	}

	#[tokio::test]
	async fn get_by_name_finds_created_domain() {
		let repo = InMemoryDomainRepository::new();
		let created = repo.create("example.com", &"a".repeat(32)).await.expect("create");
		let found = repo.get_by_name("example.com").await.expect("found");
		assert_eq!(found.id, created.id);
	}

	#[tokio::test]
	async fn update_applies_patch_fields_and_bumps_updated_at() {
		let repo = InMemoryDomainRepository::new();
		let created = repo.create("example.com", &"a".repeat(32)).await.expect("create");
		let patch = DomainPatch { status: Patch::Value(mailcert_types::DomainStatus::DnsVerified), ..Default::default() };
		let updated = repo.update(created.id, patch).await.expect("update");
		assert_eq!(updated.status, mailcert_types::DomainStatus::DnsVerified);
	}

	#[tokio::test]
	async fn get_expiring_filters_and_orders_by_expiry() {
		let repo = InMemoryCertificateRepository::new();
		let now = Timestamp::now();
		let soon = DomainCertificate {
			domain_id: DomainId(1),
			domain_name: "a.example.com".into(),
			cert_path: "a".into(),
			key_path: "a".into(),
			issued_at: now,
			expires_at: now.add_seconds(10 * 86_400),
			auto_renew: true,
		};
		let far = DomainCertificate {
			domain_id: DomainId(2),
			domain_name: "b.example.com".into(),
			cert_path: "b".into(),
			key_path: "b".into(),
			issued_at: now,
			expires_at: now.add_seconds(90 * 86_400),
			auto_renew: true,
		};
		repo.upsert(&far).await.expect("upsert far");
		repo.upsert(&soon).await.expect("upsert soon");

		let expiring = repo.get_expiring(30).await.expect("get_expiring");
		assert_eq!(expiring.len(), 1);
		assert_eq!(expiring[0].domain_id, DomainId(1));
	}
}

// vim: ts=4
