//! Domain lifecycle orchestration (component F, spec.md §4.F): validate,
//! call the repository, log, best-effort side-effect — the same shape the
//! teacher's `cloudillo-proxy::admin` handlers use, minus the `axum`
//! extractors (the HTTP surface is out of scope here).

use std::sync::Arc;

use mailcert_audit::AuditLogStore;
use mailcert_types::prelude::*;
use mailcert_types::{AcmeChallengeState, Domain, DomainPatch, DomainRepository, DomainStatus};
use rand::Rng;

const CHALLENGE_TOKEN_LEN: usize = 32;
const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

const MX_PRIORITY: u16 = 10;
const DNS_TTL: u32 = 3600;

/// One record in the operator-facing DNS provisioning guide
/// (spec.md §4.F `GetDNSGuide`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsGuideRecord {
	pub record_type: Box<str>,
	pub name: Box<str>,
	pub value: Box<str>,
	pub priority: Option<u16>,
	pub ttl: u32,
}

/// Generates a 32-character lowercase-hex challenge token, the same
/// `rand::rng()` + `random_range` shape as the teacher's `random_id`
/// (`cloudillo_types::utils::random_id`), with the alphabet swapped to hex.
fn generate_challenge_token() -> Box<str> {
	let mut rng = rand::rng();
	let mut token = String::with_capacity(CHALLENGE_TOKEN_LEN);
	for _ in 0..CHALLENGE_TOKEN_LEN {
		token.push(HEX_ALPHABET[rng.random_range(0..HEX_ALPHABET.len())] as char);
	}
	token.into_boxed_str()
}

/// Orchestrates domain creation and lifecycle transitions against a
/// [`DomainRepository`], the way `AppState` holds an `Arc<dyn AuthAdapter>`
/// in the teacher.
#[derive(Debug)]
pub struct DomainManager {
	repository: Arc<dyn DomainRepository>,
	audit: Arc<AuditLogStore>,
	smtp_hostname: Box<str>,
	server_ip: Box<str>,
}

impl DomainManager {
	pub fn new(repository: Arc<dyn DomainRepository>, audit: Arc<AuditLogStore>, smtp_hostname: Box<str>, server_ip: Box<str>) -> Self {
		Self { repository, audit, smtp_hostname, server_ip }
	}

	/// `CreateDomain(name)` (spec.md §4.F): mints a fresh 32-hex challenge
	/// token and inserts the domain in `pending_dns`.
	pub async fn create_domain(&self, name: &str) -> ClResult<Domain> {
		let token = generate_challenge_token();
		self.audit.start_domain_log(name).await;
		match self.repository.create(name, &token).await {
			Ok(domain) => {
				self.audit.info(name, "create_domain", "domain registered, awaiting DNS provisioning").await;
				Ok(domain)
			}
			Err(e) => {
				self.audit.mark_failed(name, &e.to_string()).await;
				Err(e)
			}
		}
	}

	pub async fn get_domain(&self, id: DomainId) -> ClResult<Domain> {
		self.repository.get(id).await
	}

	pub async fn list_domains(&self) -> ClResult<Vec<Domain>> {
		self.repository.list().await
	}

	/// `UpdateStatus(id, status, errMsg)` (spec.md §4.F): writes the new
	/// status and error message, clearing the message unless the target is
	/// `Failed`.
	pub async fn update_status(&self, id: DomainId, status: DomainStatus, error_message: Option<Box<str>>) -> ClResult<Domain> {
		let domain = self.repository.get(id).await?;
		let message_patch = if status == DomainStatus::Failed {
			match error_message {
				Some(m) => Patch::Value(m),
				None => Patch::Null,
			}
		} else {
			Patch::Null
		};
		let patch = DomainPatch { status: Patch::Value(status), error_message: message_patch, ..Default::default() };
		let updated = self.repository.update(id, patch).await?;
		if status == DomainStatus::Failed {
			if let Some(m) = &updated.error_message {
				self.audit.error(&domain.name, "update_status", m).await;
				self.audit.set_status(&domain.name, mailcert_audit::LogStatus::Failed).await;
			}
		} else {
			self.audit.info(&domain.name, "update_status", &format!("status -> {status:?}")).await;
		}
		Ok(updated)
	}

	/// `GetDNSGuide(id)` (spec.md §4.F): MX at apex, A at `mail.<apex>`, TXT
	/// at `_infinimail.<apex>`, with Name/Value derived from the
	/// `mail.`-prefix normalization shared with the DNS verifier (§4.C).
	pub async fn get_dns_guide(&self, id: DomainId) -> ClResult<Vec<DnsGuideRecord>> {
		let domain = self.repository.get(id).await?;
		let (apex, mail_host) = crate::domain_apex_and_mail_host(&domain.name);

		Ok(vec![
			DnsGuideRecord {
				record_type: "MX".into(),
				name: apex.clone(),
				value: self.smtp_hostname.clone(),
				priority: Some(MX_PRIORITY),
				ttl: DNS_TTL,
			},
			DnsGuideRecord { record_type: "A".into(), name: mail_host, value: self.server_ip.clone(), priority: None, ttl: DNS_TTL },
			DnsGuideRecord {
				record_type: "TXT".into(),
				name: format!("_infinimail.{apex}").into_boxed_str(),
				value: format!("infinimail-verify={}", domain.dns_challenge).into_boxed_str(),
				priority: None,
				ttl: DNS_TTL,
			},
		])
	}

	/// `ActivateDomain(id)` (spec.md §4.F): requires `certificate_issued`,
	/// sets `is_active=true` and status `active`.
	pub async fn activate_domain(&self, id: DomainId) -> ClResult<Domain> {
		let domain = self.repository.get(id).await?;
		if domain.status != DomainStatus::CertificateIssued {
			return Err(Error::StateError(format!(
				"cannot activate domain in status {:?}, must be certificate_issued",
				domain.status
			)));
		}
		let patch = DomainPatch { is_active: Patch::Value(true), status: Patch::Value(DomainStatus::Active), ..Default::default() };
		let updated = self.repository.update(id, patch).await?;
		self.audit.info(&domain.name, "activate_domain", "domain activated for live mail traffic").await;
		self.audit.mark_success(&domain.name).await;
		Ok(updated)
	}

	/// `GenerateChallengeForLegacyDomain(id)` (spec.md §4.F): a migration
	/// hook. Mints a fresh token and forces `pending_dns` if the domain has
	/// none; otherwise a no-op.
	pub async fn generate_challenge_for_legacy_domain(&self, id: DomainId) -> ClResult<Domain> {
		let domain = self.repository.get(id).await?;
		if !domain.dns_challenge.is_empty() {
			return Ok(domain);
		}
		let token = generate_challenge_token();
		let patch = DomainPatch {
			status: Patch::Value(DomainStatus::PendingDns),
			dns_challenge: Patch::Value(token.clone()),
			..Default::default()
		};
		let updated = self.repository.update(id, patch).await?;
		self.audit.info(&domain.name, "generate_challenge_for_legacy_domain", &format!("minted challenge token {token}")).await;
		Ok(updated)
	}
}


// vim: ts=4
