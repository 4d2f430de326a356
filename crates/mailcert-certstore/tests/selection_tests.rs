//! SNI selection and reload integration tests (spec.md §8 scenario 6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mailcert_certstore::CertificateStore;
use mailcert_storage::CertificateStorage;
use rustls::sign::CertifiedKey;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

fn install_default_crypto_provider() {
	let _ = rustls::crypto::ring::default_provider().install_default();
}

fn certified_key_for(domain: &str) -> Arc<CertifiedKey> {
	let key_pair = rcgen::KeyPair::generate().expect("key generation should succeed");
	let params = rcgen::CertificateParams::new(vec![domain.to_string()]).expect("valid params");
	let cert = params.self_signed(&key_pair).expect("self-signing should succeed");
	let cert_pem = cert.pem();
	let key_pem = key_pair.serialize_pem();

	let certs: Vec<CertificateDer<'static>> =
		CertificateDer::pem_slice_iter(cert_pem.as_bytes()).filter_map(Result::ok).collect();
	let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes()).expect("valid key pem");
	let provider = rustls::crypto::CryptoProvider::get_default().expect("provider installed");
	Arc::new(CertifiedKey::from_der(certs, key, provider).expect("certified key"))
}

fn new_store() -> Arc<CertificateStore> {
	install_default_crypto_provider();
	let storage = Arc::new(CertificateStorage::new(std::env::temp_dir()));
	Arc::new(CertificateStore::new(storage))
}

#[test]
fn sni_selection_exact_parent_default_then_fail() {
	let store = new_store();
	store.add_certificate("example.com", certified_key_for("example.com"));
	store.add_certificate("other.com", certified_key_for("other.com"));
	let default_cert = certified_key_for("default");
	store.set_default_certificate(default_cert.clone());

	let selector = store.get_certificate_func();

	// Exact match.
	assert!(Arc::ptr_eq(&selector("example.com").expect("exact match"), &store.get_certificate("example.com").expect("present")));

	// Parent match: "mail.example.com" has no exact entry but "example.com" does.
	let via_parent = selector("mail.example.com").expect("parent match should resolve");
	assert!(Arc::ptr_eq(&via_parent, &store.get_certificate("example.com").expect("present")));

	// Unknown SNI falls to default.
	let via_default = selector("unknown.invalid").expect("default should serve unknown SNI");
	assert!(Arc::ptr_eq(&via_default, &default_cert));

	// Empty SNI falls straight through to default.
	let via_empty = selector("").expect("default should serve empty SNI");
	assert!(Arc::ptr_eq(&via_empty, &default_cert));
}

#[test]
fn selection_fails_with_no_default_and_unknown_sni() {
	let store = new_store();
	store.add_certificate("example.com", certified_key_for("example.com"));
	let selector = store.get_certificate_func();
	assert!(selector("unknown.invalid").is_none());
}

#[tokio::test]
async fn load_and_add_certificate_double_inserts_and_notifies_subscribers() {
	install_default_crypto_provider();
	let dir = tempfile::TempDir::new().expect("temp dir");
	let storage = Arc::new(CertificateStorage::new(dir.path()));

	let key_pair = rcgen::KeyPair::generate().expect("key generation should succeed");
	let params = rcgen::CertificateParams::new(vec!["example.com".to_string()]).expect("valid params");
	let cert = params.self_signed(&key_pair).expect("self-signing should succeed");
	let bundle = mailcert_storage::CertificateBundle {
		leaf_pem: cert.pem().into_boxed_str(),
		chain_pem: None,
		key_pem: key_pair.serialize_pem().into_boxed_str(),
	};
	storage.save_certificate("example.com", &bundle).await.expect("save should succeed");

	let store = Arc::new(CertificateStore::new(storage));
	let calls = Arc::new(AtomicUsize::new(0));
	let calls_clone = calls.clone();
	store.register_reload_callback(Arc::new(move |_name: &str| {
		calls_clone.fetch_add(1, Ordering::SeqCst);
	}));

	store.load_and_add_certificate("example.com").await.expect("load should succeed");

	assert!(store.get_certificate("example.com").is_some());
	assert!(store.get_certificate("mail.example.com").is_some());
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
