//! Domain and certificate data model.

use serde::{Deserialize, Serialize};

use crate::types::{DomainId, Patch, Timestamp};

/// Lifecycle state of a domain, per the Domain Manager state machine
/// (spec.md §4.F). Wire tag is the lowercase snake_case variant name,
/// matching the state names used throughout the spec's transition table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
	/// Created, 32-hex DNS challenge minted, awaiting operator DNS publication.
	PendingDns,
	/// Authoritative DNS confirmed MX/A/TXT records (`VerifyDNS` all_verified).
	DnsVerified,
	/// ACME order requested; `_acme-challenge` TXT value handed to the operator.
	PendingAcmeChallenge,
	/// ACME DNS-01 pre-check passed; ready to submit the challenge to the CA.
	AcmeChallengeReady,
	/// Challenge submitted to the CA, certificate finalization in flight.
	PendingCertificate,
	/// Certificate issued and installed into the certificate store.
	CertificateIssued,
	/// Operator has activated the domain for live mail traffic.
	Active,
	/// Terminal failure sink for any step; `error_message` carries the cause.
	Failed,
}

/// State of an in-flight ACME DNS-01 challenge for a domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcmeChallengeState {
	pub token: Box<str>,
	pub value: Box<str>,
	pub expires_at: Timestamp,
	pub dns_verified: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Domain {
	pub id: DomainId,
	pub name: Box<str>,
	pub is_active: bool,
	pub status: DomainStatus,
	/// 32 lowercase hex characters, published as `_infinimail.<apex>` TXT value.
	pub dns_challenge: Box<str>,
	pub error_message: Option<Box<str>>,
	pub acme_challenge: Option<AcmeChallengeState>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl Domain {
	/// Invariant (spec.md §3/§8): `is_active ⇒ status = Active`.
	pub fn is_active_invariant_holds(&self) -> bool {
		!self.is_active || self.status == DomainStatus::Active
	}

	/// Invariant (spec.md §8): `status = AcmeChallengeReady ⇔ dns_verified = true`
	/// and the stored challenge is non-expired at the moment checked.
	pub fn acme_challenge_ready_invariant_holds(&self, now: Timestamp) -> bool {
		match self.status {
			DomainStatus::AcmeChallengeReady => match &self.acme_challenge {
				Some(c) => c.dns_verified && c.expires_at.seconds_until(now) > 0,
				None => false,
			},
			_ => true,
		}
	}
}

/// Partial-update request for [`Domain`], mirrors the `Patch<T>` convention
/// used across the platform for PATCH-shaped repository calls.
#[derive(Clone, Debug, Default)]
pub struct DomainPatch {
	pub is_active: Patch<bool>,
	pub status: Patch<DomainStatus>,
	pub dns_challenge: Patch<Box<str>>,
	pub error_message: Patch<Box<str>>,
	pub acme_challenge: Patch<AcmeChallengeState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainCertificate {
	pub domain_id: DomainId,
	pub domain_name: Box<str>,
	pub cert_path: Box<str>,
	pub key_path: Box<str>,
	pub issued_at: Timestamp,
	pub expires_at: Timestamp,
	pub auto_renew: bool,
}

// vim: ts=4
