//! Mailcert is automated TLS certificate lifecycle management for a
//! multi-tenant mail service.
//!
//! # Components
//!
//! - Domain lifecycle state machine and its persisted data ([`core::domain_manager`])
//! - ACME DNS-01 manual-verification protocol driver ([`acme`])
//! - Authoritative DNS verifier, multi-resolver, retry-aware ([`dns`])
//! - Certificate store: in-memory SNI table with hot reload ([`certstore`])
//! - Renewal scheduler: periodic scan, auto-renew policy ([`core::renewal_scheduler`])
//! - Structured per-domain audit log ([`audit`])
//!
//! The HTTP/REST surface, the IMAP/SMTP servers that consume the SNI table,
//! the mailbox/message data plane, attachment blob storage, the relational
//! persistence engine, WebSocket fan-out, and configuration loading are
//! out of scope for this crate; callers provide their own collaborators
//! behind the [`types::DomainRepository`]/[`types::CertificateRepository`]
//! traits the way `cloudillo`'s adapter crates plug into its core.

// Re-export shared types and repository traits from mailcert-types
pub use mailcert_types as types;
pub use mailcert_types::{lock, ClResult, Domain, DomainCertificate, DomainId, DomainPatch, DomainStatus, Error, Patch, Timestamp};

// Feature crate re-exports, one per component (spec.md §2)
pub use mailcert_acme as acme;
pub use mailcert_audit as audit;
pub use mailcert_certstore as certstore;
pub use mailcert_dns as dns;
pub use mailcert_storage as storage;

pub use mailcert_core as core;
pub use mailcert_core::{
	AcmeChallengeInfo, AcmeStatusView, CertificateManager, DnsGuideRecord, DnsVerificationOutcome, DomainManager,
	InMemoryCertificateRepository, InMemoryDomainRepository, RenewalSchedulerConfig, RenewalSchedulerHandle,
};

// vim: ts=4
