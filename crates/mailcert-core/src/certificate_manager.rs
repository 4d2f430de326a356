//! Certificate issuance orchestration (component G, spec.md §4.G): the
//! `cloudillo-core::acme::renew_tenant`/`renew_proxy_site_cert` "look up,
//! call the ACME driver, call storage, upsert the repository, hot-reload
//! the certificate store" pattern, generalized into the full manual
//! multi-step state machine with every transition checked against the
//! domain's current status and every failure path logged to the audit
//! trail before returning.

use std::sync::Arc;

use mailcert_acme::AcmeDriver;
use mailcert_audit::AuditLogStore;
use mailcert_certstore::CertificateStore;
use mailcert_dns::{any_public_resolver_sees, DnsVerificationResult, DnsVerifier, DEFAULT_PUBLIC_RESOLVERS};
use mailcert_storage::{CertificateBundle, CertificateStorage};
use mailcert_types::prelude::*;
use mailcert_types::{AcmeChallengeState, CertificateRepository, Domain, DomainCertificate, DomainPatch, DomainRepository, DomainStatus};
use tokio_util::sync::CancellationToken;

/// ACME challenge expiry (spec.md §4.F transition table: `expires_at=now+24h`).
const CHALLENGE_EXPIRY_SECONDS: i64 = 24 * 3600;

/// `RequestACMEChallenge`'s response (spec.md §4.G).
#[derive(Clone, Debug)]
pub struct AcmeChallengeInfo {
	pub txt_record_name: Box<str>,
	pub txt_record_value: Box<str>,
	pub expires_at: Timestamp,
	pub propagation_note: Box<str>,
}

/// `VerifyACMEDNS`'s response (spec.md §4.G).
#[derive(Clone, Debug)]
pub struct DnsVerificationOutcome {
	pub verified: bool,
	pub message: Box<str>,
}

/// `GetACMEStatus`'s denormalized view (spec.md §4.G).
#[derive(Clone, Debug)]
pub struct AcmeStatusView {
	pub status: DomainStatus,
	pub dns_verified: bool,
	pub challenge_expires_at: Option<Timestamp>,
	pub error_message: Option<Box<str>>,
}

pub struct CertificateManager {
	domains: Arc<dyn DomainRepository>,
	certificates: Arc<dyn CertificateRepository>,
	acme: Arc<AcmeDriver>,
	dns: Arc<DnsVerifier>,
	storage: Arc<CertificateStorage>,
	store: tokio::sync::RwLock<Option<Arc<CertificateStore>>>,
	audit: Arc<AuditLogStore>,
}

impl std::fmt::Debug for CertificateManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CertificateManager").finish_non_exhaustive()
	}
}

impl CertificateManager {
	pub fn new(
		domains: Arc<dyn DomainRepository>,
		certificates: Arc<dyn CertificateRepository>,
		acme: Arc<AcmeDriver>,
		dns: Arc<DnsVerifier>,
		storage: Arc<CertificateStorage>,
		audit: Arc<AuditLogStore>,
	) -> Self {
		Self { domains, certificates, acme, dns, storage, store: tokio::sync::RwLock::new(None), audit }
	}

	/// `SetCertificateStore(E)` (spec.md §4.G): wires in the hot-reload
	/// target used after issuance/renewal.
	pub async fn set_certificate_store(&self, store: Arc<CertificateStore>) {
		*self.store.write().await = Some(store);
	}

	/// Drives the DNS Verifier (C) against a domain's authoritative records
	/// and, on `all_verified`, advances the state machine from `pending_dns`
	/// to `dns_verified` (spec.md §4.F transition table, §4.C; end-to-end
	/// scenarios 1 and 2). A mismatch leaves the domain in `pending_dns` and
	/// the result names the found-vs-expected values — the orchestrator
	/// never recovers a `DNSFailure` silently (spec.md §7).
	pub async fn verify_dns(&self, domain_id: DomainId) -> ClResult<DnsVerificationResult> {
		let domain = self.domains.get(domain_id).await?;
		if domain.status != DomainStatus::PendingDns {
			return Err(Error::StateError(format!("VerifyDNS requires pending_dns, domain is {:?}", domain.status)));
		}

		let cancel = CancellationToken::new();
		let result = self.dns.verify_dns(&domain.name, &domain.dns_challenge, &cancel).await;

		if result.all_verified {
			self.domains
				.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
				.await?;
			self.audit.info(&domain.name, "verify_dns", "MX/A/TXT records verified").await;
		} else {
			self.audit.warning(&domain.name, "verify_dns", &format!("DNS verification incomplete: {:?}", result.errors)).await;
		}

		Ok(result)
	}

	/// `RequestACMEChallenge(domainID)` (spec.md §4.G): requires
	/// `dns_verified`; asks the ACME driver for a DNS-01 challenge and
	/// stores it with a 24h expiry.
	pub async fn request_acme_challenge(&self, domain_id: DomainId) -> ClResult<AcmeChallengeInfo> {
		let domain = self.domains.get(domain_id).await?;
		if domain.status != DomainStatus::DnsVerified {
			return Err(Error::StateError(format!("RequestACMEChallenge requires dns_verified, domain is {:?}", domain.status)));
		}
		self.issue_challenge(&domain).await
	}

	async fn issue_challenge(&self, domain: &Domain) -> ClResult<AcmeChallengeInfo> {
		let (apex, _mail_host) = crate::domain_apex_and_mail_host(&domain.name);

		let challenge = match self.acme.get_dns_challenge(&apex).await {
			Ok(c) => c,
			Err(e) => return Err(self.fail(domain, "request_acme_challenge", e).await),
		};

		let expires_at = Timestamp::from_now(CHALLENGE_EXPIRY_SECONDS);
		let acme_challenge = AcmeChallengeState { token: challenge.token, value: challenge.txt_record.clone(), expires_at, dns_verified: false };
		let patch = DomainPatch {
			acme_challenge: Patch::Value(acme_challenge),
			status: Patch::Value(DomainStatus::PendingAcmeChallenge),
			..Default::default()
		};
		self.domains.update(domain.id, patch).await?;

		let txt_record_name = format!("_acme-challenge.{apex}").into_boxed_str();
		self.audit.info(&domain.name, "request_acme_challenge", &format!("publish TXT {txt_record_name} = {}", challenge.txt_record)).await;

		Ok(AcmeChallengeInfo {
			txt_record_name,
			txt_record_value: challenge.txt_record,
			expires_at,
			propagation_note: "DNS propagation can take up to several minutes; call VerifyACMEDNS once published".into(),
		})
	}

	/// `VerifyACMEDNS(domainID)` (spec.md §4.G): rejects without a stored
	/// challenge; auto-rotates an expired one; otherwise performs the
	/// multi-resolver TXT check (§4.C).
	pub async fn verify_acme_dns(&self, domain_id: DomainId) -> ClResult<DnsVerificationOutcome> {
		let domain = self.domains.get(domain_id).await?;
		let challenge = domain.acme_challenge.clone().ok_or_else(|| Error::StateError("no stored ACME challenge".into()))?;

		if challenge.expires_at.seconds_until(Timestamp::now()) <= 0 {
			self.domains
				.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
				.await?;
			let rotated = self.domains.get(domain.id).await?;
			let info = self.issue_challenge(&rotated).await?;
			return Ok(DnsVerificationOutcome {
				verified: false,
				message: format!(
					"the previous challenge expired; a new one was issued, publish TXT {} = {}",
					info.txt_record_name, info.txt_record_value
				)
				.into_boxed_str(),
			});
		}

		let (apex, _mail_host) = crate::domain_apex_and_mail_host(&domain.name);
		let record_name = format!("_acme-challenge.{apex}");
		let seen = any_public_resolver_sees(&record_name, &challenge.value, &DEFAULT_PUBLIC_RESOLVERS).await;

		if seen {
			let mut updated_challenge = challenge;
			updated_challenge.dns_verified = true;
			self.domains
				.update(
					domain.id,
					DomainPatch {
						acme_challenge: Patch::Value(updated_challenge),
						status: Patch::Value(DomainStatus::AcmeChallengeReady),
						..Default::default()
					},
				)
				.await?;
			self.audit.info(&domain.name, "verify_acme_dns", "public resolvers confirmed the ACME challenge TXT record").await;
			Ok(DnsVerificationOutcome { verified: true, message: "ACME DNS-01 challenge verified".into() })
		} else {
			Ok(DnsVerificationOutcome {
				verified: false,
				message: format!("expected TXT {record_name} = {}, not yet visible from public resolvers", challenge.value)
					.into_boxed_str(),
			})
		}
	}

	/// `SubmitACMEChallenge(domainID)` (spec.md §4.G): requires
	/// `acme_challenge_ready` and `dns_verified=true`; runs the full
	/// completion + finalize + store + hot-reload sequence.
	pub async fn submit_acme_challenge(&self, domain_id: DomainId) -> ClResult<Domain> {
		let domain = self.domains.get(domain_id).await?;
		self.require_challenge_ready(&domain)?;
		self.issue_certificate(domain).await
	}

	/// `GenerateCertificate(domain)` (spec.md §4.G): legacy entry point,
	/// same contract as `SubmitACMEChallenge` but with an explicit message
	/// steering callers still in `dns_verified` toward the manual flow.
	pub async fn generate_certificate(&self, domain_id: DomainId) -> ClResult<Domain> {
		let domain = self.domains.get(domain_id).await?;
		if domain.status == DomainStatus::DnsVerified {
			return Err(Error::StateError(
				"GenerateCertificate no longer starts from dns_verified; call RequestACMEChallenge and VerifyACMEDNS first".into(),
			));
		}
		self.require_challenge_ready(&domain)?;
		self.issue_certificate(domain).await
	}

	fn require_challenge_ready(&self, domain: &Domain) -> ClResult<()> {
		if domain.status != DomainStatus::AcmeChallengeReady {
			return Err(Error::StateError(format!("requires acme_challenge_ready, domain is {:?}", domain.status)));
		}
		let dns_verified = domain.acme_challenge.as_ref().is_some_and(|c| c.dns_verified);
		if !dns_verified {
			return Err(Error::StateError("stored ACME challenge is not yet dns_verified".into()));
		}
		Ok(())
	}

	async fn issue_certificate(&self, domain: Domain) -> ClResult<Domain> {
		self.domains
			.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::PendingCertificate), ..Default::default() })
			.await?;

		let (apex, mail_host) = crate::domain_apex_and_mail_host(&domain.name);
		let cancel = CancellationToken::new();

		if let Err(e) = self.acme.complete_dns_challenge(&apex, &cancel).await {
			return Err(self.fail(&domain, "submit_acme_challenge", e).await);
		}

		let issued = match self.acme.request_certificate(&[apex, mail_host]).await {
			Ok(cert) => cert,
			Err(e) => return Err(self.fail(&domain, "submit_acme_challenge", e).await),
		};

		let bundle = CertificateBundle { leaf_pem: issued.leaf_pem, chain_pem: issued.chain_pem, key_pem: issued.key_pem };
		let stored = match self.storage.save_certificate(&domain.name, &bundle).await {
			Ok(s) => s,
			Err(e) => return Err(self.fail(&domain, "submit_acme_challenge", e).await),
		};

		let cert_row = DomainCertificate {
			domain_id: domain.id,
			domain_name: domain.name.clone(),
			cert_path: stored.cert_path.to_string_lossy().into_owned().into_boxed_str(),
			key_path: stored.key_path.to_string_lossy().into_owned().into_boxed_str(),
			issued_at: stored.issued_at,
			expires_at: stored.expires_at,
			auto_renew: true,
		};
		if let Err(e) = self.certificates.upsert(&cert_row).await {
			return Err(self.fail(&domain, "submit_acme_challenge", e).await);
		}

		let updated = self
			.domains
			.update(
				domain.id,
				DomainPatch {
					status: Patch::Value(DomainStatus::CertificateIssued),
					acme_challenge: Patch::Null,
					..Default::default()
				},
			)
			.await?;

		if let Some(store) = self.store.read().await.as_ref() {
			if let Err(e) = store.load_and_add_certificate(&domain.name).await {
				warn!(domain = %domain.name, error = %e, "certificate issued but hot reload failed");
				self.audit.warning(&domain.name, "submit_acme_challenge", &format!("hot reload failed: {e}")).await;
			}
		}

		self.audit.info(&domain.name, "submit_acme_challenge", "certificate issued and installed").await;
		self.audit.mark_success(&domain.name).await;
		Ok(updated)
	}

	/// `RenewCertificate(domainID)` (spec.md §4.G): obtains a fresh
	/// challenge and runs the full cycle against the existing certificate
	/// row, without transitioning the domain's lifecycle status.
	pub async fn renew_certificate(&self, domain_id: DomainId) -> ClResult<()> {
		let domain = self.domains.get(domain_id).await?;
		let existing = self.certificates.get_by_domain(domain_id).await?;
		let (apex, mail_host) = crate::domain_apex_and_mail_host(&domain.name);
		let cancel = CancellationToken::new();

		macro_rules! log_err {
			($result:expr) => {
				match $result {
					Ok(v) => v,
					Err(e) => {
						self.audit.error(&domain.name, "renew_certificate", &e.to_string()).await;
						return Err(e);
					}
				}
			};
		}

		log_err!(self.acme.get_dns_challenge(&apex).await);
		log_err!(self.acme.complete_dns_challenge(&apex, &cancel).await);
		let issued = log_err!(self.acme.request_certificate(&[apex, mail_host]).await);

		let bundle = CertificateBundle { leaf_pem: issued.leaf_pem, chain_pem: issued.chain_pem, key_pem: issued.key_pem };
		let stored = log_err!(self.storage.save_certificate(&domain.name, &bundle).await);

		let renewed_row = DomainCertificate {
			domain_id,
			domain_name: domain.name.clone(),
			cert_path: stored.cert_path.to_string_lossy().into_owned().into_boxed_str(),
			key_path: stored.key_path.to_string_lossy().into_owned().into_boxed_str(),
			issued_at: stored.issued_at,
			expires_at: stored.expires_at,
			auto_renew: existing.auto_renew,
		};
		log_err!(self.certificates.upsert(&renewed_row).await);

		if let Some(store) = self.store.read().await.as_ref() {
			if let Err(e) = store.load_and_add_certificate(&domain.name).await {
				warn!(domain = %domain.name, error = %e, "certificate renewed but hot reload failed");
				self.audit.warning(&domain.name, "renew_certificate", &format!("hot reload failed: {e}")).await;
			}
		}

		self.audit.info(&domain.name, "renew_certificate", "certificate renewed").await;
		Ok(())
	}

	pub async fn get_expiring_certificates(&self, days: u32) -> ClResult<Vec<DomainCertificate>> {
		self.certificates.get_expiring(days).await
	}

	pub async fn get_all_with_auto_renew(&self) -> ClResult<Vec<DomainCertificate>> {
		self.certificates.get_all_with_auto_renew().await
	}

	pub async fn delete_certificate(&self, domain_id: DomainId) -> ClResult<()> {
		let domain = self.domains.get(domain_id).await?;
		self.certificates.delete(domain_id).await?;
		self.storage.delete_certificate(&domain.name).await?;
		if let Some(store) = self.store.read().await.as_ref() {
			store.remove_certificate(&domain.name);
		}
		self.audit.info(&domain.name, "delete_certificate", "certificate deleted").await;
		Ok(())
	}

	pub async fn set_auto_renew(&self, domain_id: DomainId, auto_renew: bool) -> ClResult<()> {
		let mut cert = self.certificates.get_by_domain(domain_id).await?;
		cert.auto_renew = auto_renew;
		self.certificates.upsert(&cert).await
	}

	/// `GetACMEStatus(domainID)` (spec.md §4.G): a denormalized view that
	/// auto-rotates an expired challenge observed in `pending_acme_challenge`
	/// before returning.
	pub async fn get_acme_status(&self, domain_id: DomainId) -> ClResult<AcmeStatusView> {
		let mut domain = self.domains.get(domain_id).await?;

		if domain.status == DomainStatus::PendingAcmeChallenge {
			if let Some(challenge) = &domain.acme_challenge {
				if challenge.expires_at.seconds_until(Timestamp::now()) <= 0 {
					self.domains
						.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
						.await?;
					let rotated = self.domains.get(domain.id).await?;
					self.issue_challenge(&rotated).await?;
					domain = self.domains.get(domain_id).await?;
				}
			}
		}

		Ok(AcmeStatusView {
			status: domain.status,
			dns_verified: domain.acme_challenge.as_ref().is_some_and(|c| c.dns_verified),
			challenge_expires_at: domain.acme_challenge.as_ref().map(|c| c.expires_at),
			error_message: domain.error_message,
		})
	}

	/// Transitions `domain` to `failed` with a descriptive message and
	/// writes it to the audit log, returning the original error unchanged
	/// so callers can propagate it (spec.md §4.G failure semantics, §7).
	async fn fail(&self, domain: &Domain, step: &str, e: Error) -> Error {
		let message = e.to_string();
		if let Err(update_err) = self
			.domains
			.update(
				domain.id,
				DomainPatch {
					status: Patch::Value(DomainStatus::Failed),
					error_message: Patch::Value(message.clone().into_boxed_str()),
					..Default::default()
				},
			)
			.await
		{
			warn!(domain = %domain.name, error = %update_err, "failed to record failure status on domain");
		}
		self.audit.error(&domain.name, step, &message).await;
		self.audit.set_status(&domain.name, mailcert_audit::LogStatus::Failed).await;
		e
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::in_memory::{InMemoryCertificateRepository, InMemoryDomainRepository};
	use mailcert_acme::AcmeDriverConfig;
	use mailcert_dns::DnsVerifierConfig;
	use tempfile::tempdir;

	fn manager() -> (CertificateManager, Arc<dyn DomainRepository>) {
		let domains: Arc<dyn DomainRepository> = InMemoryDomainRepository::new();
		let certificates: Arc<dyn CertificateRepository> = InMemoryCertificateRepository::new();
		let acme = Arc::new(AcmeDriver::new(AcmeDriverConfig::staging(vec![])));
		let dns = Arc::new(DnsVerifier::new(DnsVerifierConfig::default()).expect("dns verifier"));
		let dir = tempdir().expect("tempdir");
		let storage = Arc::new(CertificateStorage::new(dir.path().join("certs").into_boxed_path()));
		let audit = Arc::new(AuditLogStore::new(dir.path().join("audit").into_boxed_path()));
		let manager = CertificateManager::new(domains.clone(), certificates, acme, dns, storage, audit);
		(manager, domains)
	}

	#[tokio::test]
	async fn request_acme_challenge_requires_dns_verified() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		let err = manager.request_acme_challenge(domain.id).await.expect_err("not dns_verified");
		assert!(matches!(err, Error::StateError(_)));
	}

	#[tokio::test]
	async fn verify_acme_dns_fails_without_a_stored_challenge() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		let err = manager.verify_acme_dns(domain.id).await.expect_err("no challenge stored");
		assert!(matches!(err, Error::StateError(_)));
	}

	#[tokio::test]
	async fn submit_acme_challenge_requires_acme_challenge_ready_and_dns_verified() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		domains
			.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
			.await
			.expect("force status");
		let err = manager.submit_acme_challenge(domain.id).await.expect_err("not ready");
		assert!(matches!(err, Error::StateError(_)));
	}

	#[tokio::test]
	async fn generate_certificate_refuses_to_run_from_dns_verified() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		domains
			.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
			.await
			.expect("force status");
		let err = manager.generate_certificate(domain.id).await.expect_err("legacy refusal");
		assert!(matches!(err, Error::StateError(_)));
	}

	#[tokio::test]
	async fn verify_dns_requires_pending_dns() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		domains
			.update(domain.id, DomainPatch { status: Patch::Value(DomainStatus::DnsVerified), ..Default::default() })
			.await
			.expect("force status");
		let err = manager.verify_dns(domain.id).await.expect_err("already past pending_dns");
		assert!(matches!(err, Error::StateError(_)));
	}

	#[tokio::test]
	async fn set_auto_renew_requires_an_existing_certificate_row() {
		let (manager, domains) = manager();
		let domain = domains.create("example.com", &"a".repeat(32)).await.expect("create");
		let err = manager.set_auto_renew(domain.id, false).await.expect_err("no row yet");
		assert!(matches!(err, Error::NotFound));
	}
}

// vim: ts=4
