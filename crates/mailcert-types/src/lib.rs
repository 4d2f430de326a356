//! Shared types, error type and repository traits for the mailcert TLS
//! certificate lifecycle manager. Every other crate in the workspace depends
//! on this one; it has no dependency on any of its siblings.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod domain;
pub mod error;
pub mod prelude;
pub mod repository;
pub mod types;

pub use domain::{AcmeChallengeState, Domain, DomainCertificate, DomainPatch, DomainStatus};
pub use error::{ClResult, Error};
pub use repository::{CertificateRepository, DomainRepository, ReloadCallback};
pub use types::{DomainId, Patch, Timestamp};

// vim: ts=4
