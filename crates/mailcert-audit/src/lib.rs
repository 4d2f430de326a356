//! Structured per-domain audit log (component A, spec.md §4.A): append-only,
//! file-backed, drives the user-facing progress UI.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod store;
pub mod types;

pub use store::{sanitize_name, AuditLogStore};
pub use types::{AuditEntry, AuditLog, AuditLogSummary, Level, LogStatus};

// vim: ts=4
