//! Error handling subsystem. Implements the crate's error type.

use crate::prelude::*;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	Conflict(String),

	// Input validation
	ValidationError(String),

	// Domain state machine
	StateError(String),

	// DNS verification
	DnsFailure(String),

	// ACME protocol
	AcmeError(String),

	// Filesystem / certificate storage
	IoFailure(String),

	// System and configuration
	ConfigError(String),
	Internal(String),

	// Cryptography / TLS
	CryptoError(String),

	// Deadlines / cancellation (§5 suspension points)
	Timeout(String),
	Cancelled,

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json error: {}", err);
		Error::ValidationError(format!("json error: {err}"))
	}
}

impl From<instant_acme::Error> for Error {
	fn from(err: instant_acme::Error) -> Self {
		warn!("acme error: {}", err);
		Error::AcmeError(err.to_string())
	}
}

impl From<rcgen::Error> for Error {
	fn from(err: rcgen::Error) -> Self {
		warn!("rcgen error: {}", err);
		Error::CryptoError(format!("certificate request error: {err}"))
	}
}

impl From<pem::PemError> for Error {
	fn from(err: pem::PemError) -> Self {
		warn!("pem error: {}", err);
		Error::CryptoError(format!("PEM parsing error: {err}"))
	}
}

impl From<rustls::Error> for Error {
	fn from(err: rustls::Error) -> Self {
		warn!("rustls error: {}", err);
		Error::CryptoError(format!("TLS error: {err}"))
	}
}

impl From<rustls_pki_types::pem::Error> for Error {
	fn from(err: rustls_pki_types::pem::Error) -> Self {
		warn!("pem error: {}", err);
		Error::CryptoError(format!("PEM parsing error: {err}"))
	}
}

impl From<x509_parser::asn1_rs::Err<x509_parser::error::X509Error>> for Error {
	fn from(err: x509_parser::asn1_rs::Err<x509_parser::error::X509Error>) -> Self {
		warn!("x509 error: {}", err);
		Error::CryptoError(format!("X.509 certificate error: {err}"))
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", err);
		Error::Internal(format!("task execution failed: {err}"))
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(err: tokio::time::error::Elapsed) -> Self {
		Error::Timeout(err.to_string())
	}
}

/// Helper macro for locking a `parking_lot` mutex/rwlock and logging the
/// guard name when the call site wants to distinguish which lock is held.
/// `parking_lot` locks never poison, so this is a thin readability wrapper
/// rather than a fallible conversion like the `std::sync` original.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex.lock()
	};
}

// vim: ts=4
