//! Repository traits consumed by the Domain Manager and Certificate Manager.
//!
//! The relational persistence engine that backs these traits in production is
//! out of scope for this crate; callers provide their own implementation the
//! way `AuthAdapter` implementations are plugged into the wider platform.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::domain::{Domain, DomainCertificate, DomainPatch};
use crate::error::ClResult;
use crate::types::DomainId;

#[async_trait]
pub trait DomainRepository: Debug + Send + Sync {
	async fn create(&self, name: &str, dns_challenge: &str) -> ClResult<Domain>;
	async fn get(&self, id: DomainId) -> ClResult<Domain>;
	async fn get_by_name(&self, name: &str) -> ClResult<Domain>;
	async fn update(&self, id: DomainId, patch: DomainPatch) -> ClResult<Domain>;
	async fn delete(&self, id: DomainId) -> ClResult<()>;
	async fn list(&self) -> ClResult<Vec<Domain>>;
}

#[async_trait]
pub trait CertificateRepository: Debug + Send + Sync {
	async fn upsert(&self, cert: &DomainCertificate) -> ClResult<()>;
	async fn get_by_domain(&self, domain_id: DomainId) -> ClResult<DomainCertificate>;
	async fn delete(&self, domain_id: DomainId) -> ClResult<()>;
	async fn list(&self) -> ClResult<Vec<DomainCertificate>>;
	async fn get_expiring(&self, days: u32) -> ClResult<Vec<DomainCertificate>>;
	async fn get_all_with_auto_renew(&self) -> ClResult<Vec<DomainCertificate>>;
}

/// Callback invoked by the certificate store after a successful reload or
/// hot-swap, keyed by the domain name that changed. Type-erased the way
/// `cloudillo_core`'s action-verification hooks are, so callers can subscribe
/// without the certificate store knowing about their concrete type. `Arc`
/// (rather than `Box`) so the subscriber list can be cloned cheaply and
/// invoked outside the lock that guards it (spec.md §4.E, §5).
pub type ReloadCallback = Arc<dyn Fn(&str) + Send + Sync>;

// vim: ts=4
