//! Certificate finalization (spec.md §4.D `RequestCertificate`).

use std::time::Duration;

use instant_acme::RetryPolicy;
use mailcert_types::prelude::*;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};
use x509_parser::parse_x509_certificate;

use crate::AcmeDriver;

/// A freshly issued certificate, ready to hand to certificate storage.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
	pub leaf_pem: Box<str>,
	pub chain_pem: Option<Box<str>>,
	pub key_pem: Box<str>,
	pub not_before: Timestamp,
	pub not_after: Timestamp,
}

impl AcmeDriver {
	/// Finalizes the order stored for `domains[0]` (which must be `ready`),
	/// generating a fresh EC P-256 key and a CSR with `CN=domains[0]`,
	/// `SAN=domains`. Clears the stored order and challenge for the primary
	/// domain on return, whether the finalize succeeds or fails, since a
	/// failed finalize leaves the order in an unknown state that a fresh
	/// `GetDNSChallenge` should replace rather than retry in place.
	pub async fn request_certificate(&self, domains: &[Box<str>]) -> ClResult<IssuedCertificate> {
		let primary = domains.first().ok_or_else(|| Error::ValidationError("RequestCertificate requires at least one domain".into()))?;

		let mut in_flight = self
			.orders
			.lock()
			.remove(primary.as_ref())
			.ok_or_else(|| Error::StateError(format!("no ready ACME order for {primary}")))?;

		finalize_and_download(&mut in_flight.order, domains).await
	}
}

async fn finalize_and_download(order: &mut instant_acme::Order, domains: &[Box<str>]) -> ClResult<IssuedCertificate> {
	let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;
	let domain_strings: Vec<String> = domains.iter().map(|d| d.to_string()).collect();

	let mut params = CertificateParams::new(domain_strings.clone())?;
	params.distinguished_name = DistinguishedName::new();
	params.distinguished_name.push(DnType::CommonName, domain_strings[0].clone());

	let csr = params.serialize_request(&key_pair)?;
	order.finalize_csr(csr.der()).await?;

	// Same patient retry shape the teacher uses for its own poll_certificate
	// call: Let's Encrypt can take several seconds to assemble the chain.
	let retry_policy = RetryPolicy::new().initial_delay(Duration::from_secs(1)).backoff(1.5).timeout(Duration::from_secs(90));
	let cert_chain_pem = order.poll_certificate(&retry_policy).await?;
	let key_pem: Box<str> = key_pair.serialize_pem().into_boxed_str();

	let blocks = pem::parse_many(cert_chain_pem.as_bytes())?;
	let leaf_block = blocks.first().ok_or_else(|| Error::CryptoError("ACME response contained no certificates".into()))?;
	let leaf_pem: Box<str> = pem::encode(leaf_block).into_boxed_str();
	let chain_pem = if blocks.len() > 1 {
		Some(blocks[1..].iter().map(pem::encode).collect::<Vec<_>>().join("").into_boxed_str())
	} else {
		None
	};

	let (_, parsed) = parse_x509_certificate(leaf_block.contents())?;
	let not_before = Timestamp(parsed.validity().not_before.timestamp());
	let not_after = Timestamp(parsed.validity().not_after.timestamp());

	Ok(IssuedCertificate { leaf_pem, chain_pem, key_pem, not_before, not_after })
}

// vim: ts=4
