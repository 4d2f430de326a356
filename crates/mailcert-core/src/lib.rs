//! Domain lifecycle, certificate orchestration, and the renewal scheduler
//! (components F, G, H, spec.md §4.F-§4.H): the part of the system that
//! ties the ACME driver (D), certificate storage (B), the DNS verifier (C),
//! the certificate store (E), and the audit log (A) together into the
//! per-domain state machine.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod certificate_manager;
pub mod domain_manager;
pub mod in_memory;
pub mod renewal_scheduler;

pub use certificate_manager::{AcmeChallengeInfo, AcmeStatusView, CertificateManager, DnsVerificationOutcome};
pub use domain_manager::{DnsGuideRecord, DomainManager};
pub use in_memory::{InMemoryCertificateRepository, InMemoryDomainRepository};
pub use renewal_scheduler::{RenewalSchedulerConfig, RenewalSchedulerHandle};

use mailcert_dns::{get_mail_hostname, get_parent_domain};

/// Derives the mail-service apex and its `mail.`-prefixed hostname from a
/// stored domain name, which may itself be stored either way (spec.md §4.C
/// `mail.`-prefix normalization, shared between the DNS guide and the
/// certificate manager's ACME identifiers `{apex, mail.apex}`).
pub(crate) fn domain_apex_and_mail_host(stored_name: &str) -> (Box<str>, Box<str>) {
	if stored_name.starts_with("mail.") {
		(get_parent_domain(stored_name), stored_name.into())
	} else {
		(stored_name.into(), get_mail_hostname(stored_name))
	}
}

// vim: ts=4
