//! Certificate storage (component B, spec.md §4.B): PEM serialization to a
//! permissioned on-disk directory tree, one directory per domain.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use mailcert_types::prelude::*;
use x509_parser::parse_x509_certificate;

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// A certificate bundle ready to be written to disk: the leaf PEM, an
/// optional intermediate chain PEM, and the private key PEM. Callers
/// (the ACME driver, §4.D) hand this in as-issued; `issued_at`/`expires_at`
/// are derived here from the leaf itself rather than trusted from the
/// caller, per spec.md §4.B.
#[derive(Clone, Debug)]
pub struct CertificateBundle {
	pub leaf_pem: Box<str>,
	pub chain_pem: Option<Box<str>>,
	pub key_pem: Box<str>,
}

/// Metadata about a certificate read back from storage (spec.md §4.B).
#[derive(Clone, Debug)]
pub struct StoredCertificate {
	pub cert_path: Box<Path>,
	pub key_path: Box<Path>,
	pub fullchain_pem: Box<str>,
	pub key_pem: Box<str>,
	pub issued_at: Timestamp,
	pub expires_at: Timestamp,
}

/// Filesystem layout under `base_dir`: `<base_dir>/<domain>/{fullchain.pem,
/// privkey.pem, chain.pem?}`, directories mode 0700, files mode 0600
/// (spec.md §4.B, §6).
#[derive(Debug)]
pub struct CertificateStorage {
	base_dir: Box<Path>,
}

impl CertificateStorage {
	pub fn new(base_dir: impl Into<Box<Path>>) -> Self {
		Self { base_dir: base_dir.into() }
	}

	fn domain_dir(&self, name: &str) -> PathBuf {
		self.base_dir.join(name)
	}

	pub fn get_certificate_path(&self, name: &str) -> PathBuf {
		self.domain_dir(name).join("fullchain.pem")
	}

	pub fn get_key_path(&self, name: &str) -> PathBuf {
		self.domain_dir(name).join("privkey.pem")
	}

	fn get_chain_path(&self, name: &str) -> PathBuf {
		self.domain_dir(name).join("chain.pem")
	}

	pub async fn certificate_exists(&self, name: &str) -> bool {
		tokio::fs::try_exists(self.get_certificate_path(name)).await.unwrap_or(false)
			&& tokio::fs::try_exists(self.get_key_path(name)).await.unwrap_or(false)
	}

	/// Writes `fullchain.pem` (leaf + chain), `privkey.pem`, and — when a
	/// chain was supplied — `chain.pem` alone, in that order. On a
	/// key-write failure the already-written cert file is removed; on a
	/// chain-write failure both prior files are removed (spec.md §4.B
	/// atomicity contract).
	pub async fn save_certificate(&self, name: &str, bundle: &CertificateBundle) -> ClResult<StoredCertificate> {
		let dir = self.domain_dir(name);
		tokio::fs::create_dir_all(&dir).await?;
		set_mode(&dir, DIR_MODE).await?;

		let fullchain = match &bundle.chain_pem {
			Some(chain) => format!("{}\n{}", bundle.leaf_pem, chain),
			None => bundle.leaf_pem.to_string(),
		};

		let cert_path = self.get_certificate_path(name);
		let key_path = self.get_key_path(name);

		if let Err(e) = write_private(&cert_path, fullchain.as_bytes()).await {
			return Err(e);
		}

		if let Err(e) = write_private(&key_path, bundle.key_pem.as_bytes()).await {
			let _ = tokio::fs::remove_file(&cert_path).await;
			return Err(e);
		}

		if let Some(chain) = &bundle.chain_pem {
			if let Err(e) = write_private(&self.get_chain_path(name), chain.as_bytes()).await {
				let _ = tokio::fs::remove_file(&cert_path).await;
				let _ = tokio::fs::remove_file(&key_path).await;
				return Err(e);
			}
		}

		let (issued_at, expires_at) = parse_validity(&bundle.leaf_pem)?;

		Ok(StoredCertificate {
			cert_path: cert_path.into_boxed_path(),
			key_path: key_path.into_boxed_path(),
			fullchain_pem: fullchain.into_boxed_str(),
			key_pem: bundle.key_pem.clone(),
			issued_at,
			expires_at,
		})
	}

	/// Reads back `fullchain.pem`/`privkey.pem`; fails with `NotFound` if
	/// either is missing.
	pub async fn load_certificate(&self, name: &str) -> ClResult<StoredCertificate> {
		let cert_path = self.get_certificate_path(name);
		let key_path = self.get_key_path(name);

		let fullchain = tokio::fs::read_to_string(&cert_path).await.map_err(|_| Error::NotFound)?;
		let key_pem = tokio::fs::read_to_string(&key_path).await.map_err(|_| Error::NotFound)?;
		let (issued_at, expires_at) = parse_validity(&fullchain)?;

		Ok(StoredCertificate {
			cert_path: cert_path.into_boxed_path(),
			key_path: key_path.into_boxed_path(),
			fullchain_pem: fullchain.into_boxed_str(),
			key_pem: key_pem.into_boxed_str(),
			issued_at,
			expires_at,
		})
	}

	/// Removes the domain's entire certificate directory.
	pub async fn delete_certificate(&self, name: &str) -> ClResult<()> {
		match tokio::fs::remove_dir_all(self.domain_dir(name)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

async fn write_private(path: &Path, contents: &[u8]) -> ClResult<()> {
	tokio::fs::write(path, contents).await?;
	set_mode(path, FILE_MODE).await
}

/// Explicit `chmod` after write to defeat the process umask (spec.md §4.B) —
/// grounded on certificate-manager style private-key handling in the
/// reference corpus rather than the teacher itself, which has no equivalent
/// filesystem-ownership concern in its content-addressed blob store.
async fn set_mode(path: &Path, mode: u32) -> ClResult<()> {
	let mut perms = tokio::fs::metadata(path).await?.permissions();
	perms.set_mode(mode);
	tokio::fs::set_permissions(path, perms).await?;
	Ok(())
}

/// Parses `NotBefore`/`NotAfter` from the first certificate in a PEM bundle
/// (the leaf), as `cloudillo-core::acme::renew_domains` does for `NotAfter`.
fn parse_validity(pem_bundle: &str) -> ClResult<(Timestamp, Timestamp)> {
	let pem = pem::parse(pem_bundle).map_err(|e| Error::CryptoError(format!("PEM parsing error: {e}")))?;
	let (_, cert) = parse_x509_certificate(pem.contents())?;
	let validity = cert.validity();
	Ok((Timestamp(validity.not_before.timestamp()), Timestamp(validity.not_after.timestamp())))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn get_certificate_path_uses_fullchain_name() {
		let storage = CertificateStorage::new(Path::new("/tmp/certs"));
		assert_eq!(storage.get_certificate_path("example.com"), PathBuf::from("/tmp/certs/example.com/fullchain.pem"));
		assert_eq!(storage.get_key_path("example.com"), PathBuf::from("/tmp/certs/example.com/privkey.pem"));
	}
}

// vim: ts=4
