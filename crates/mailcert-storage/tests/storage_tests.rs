//! Integration tests for certificate storage against a real filesystem.

use mailcert_storage::{CertificateBundle, CertificateStorage};
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn self_signed_bundle() -> CertificateBundle {
	let key_pair = rcgen::KeyPair::generate().expect("key generation should succeed");
	let params = rcgen::CertificateParams::new(vec!["example.com".to_string()]).expect("valid params");
	let cert = params.self_signed(&key_pair).expect("self-signing should succeed");
	CertificateBundle {
		leaf_pem: cert.pem().into_boxed_str(),
		chain_pem: None,
		key_pem: key_pair.serialize_pem().into_boxed_str(),
	}
}

#[tokio::test]
async fn save_then_load_round_trips_pem_bytes() {
	let dir = TempDir::new().expect("temp dir");
	let storage = CertificateStorage::new(dir.path());
	let bundle = self_signed_bundle();

	let saved = storage.save_certificate("example.com", &bundle).await.expect("save should succeed");
	assert!(storage.certificate_exists("example.com").await);

	let loaded = storage.load_certificate("example.com").await.expect("load should succeed");
	assert_eq!(loaded.fullchain_pem, saved.fullchain_pem);
	assert_eq!(loaded.key_pem, saved.key_pem);
	assert_eq!(loaded.expires_at.0, saved.expires_at.0);
}

#[tokio::test]
async fn saved_files_have_expected_permission_modes() {
	let dir = TempDir::new().expect("temp dir");
	let storage = CertificateStorage::new(dir.path());
	let bundle = self_signed_bundle();
	storage.save_certificate("example.com", &bundle).await.expect("save should succeed");

	let domain_dir_mode = std::fs::metadata(dir.path().join("example.com")).expect("dir exists").permissions().mode() & 0o777;
	assert_eq!(domain_dir_mode, 0o700);

	let cert_mode = std::fs::metadata(storage.get_certificate_path("example.com")).expect("file exists").permissions().mode() & 0o777;
	assert_eq!(cert_mode, 0o600);
	let key_mode = std::fs::metadata(storage.get_key_path("example.com")).expect("file exists").permissions().mode() & 0o777;
	assert_eq!(key_mode, 0o600);
}

#[tokio::test]
async fn delete_certificate_removes_all_files() {
	let dir = TempDir::new().expect("temp dir");
	let storage = CertificateStorage::new(dir.path());
	let bundle = self_signed_bundle();
	storage.save_certificate("example.com", &bundle).await.expect("save should succeed");

	storage.delete_certificate("example.com").await.expect("delete should succeed");
	assert!(!storage.certificate_exists("example.com").await);
	assert!(!dir.path().join("example.com").exists());
}

#[tokio::test]
async fn delete_certificate_is_idempotent_when_missing() {
	let dir = TempDir::new().expect("temp dir");
	let storage = CertificateStorage::new(dir.path());
	storage.delete_certificate("never-issued.example.com").await.expect("delete of missing domain is a no-op");
}

#[tokio::test]
async fn load_certificate_fails_when_key_missing() {
	let dir = TempDir::new().expect("temp dir");
	let storage = CertificateStorage::new(dir.path());
	let bundle = self_signed_bundle();
	storage.save_certificate("example.com", &bundle).await.expect("save should succeed");
	tokio::fs::remove_file(storage.get_key_path("example.com")).await.expect("remove key");

	let result = storage.load_certificate("example.com").await;
	assert!(result.is_err());
}
