//! Account registration (spec.md §4.D `RegisterAccount`, `GetAccountKey`).

use instant_acme::{Account, AccountCredentials, NewAccount};
use mailcert_types::prelude::*;

use crate::AcmeDriver;

/// Wraps a live, authenticated ACME account handle.
pub struct RegisteredAccount(pub(crate) Account);

/// The serializable form of an account's key + registration, suitable for
/// persistence by the caller (spec.md §9 Open Question 2: the driver never
/// persists this itself, only hands it back).
#[derive(Clone, Debug)]
pub struct AcmeCredentials(pub AccountCredentials);

impl AcmeDriver {
	/// Registers (or, if one already exists for this key, adopts) the ACME
	/// account. Idempotent: a creation failure is treated as "account
	/// already exists" and retried as an existing-account lookup, matching
	/// the RFC 8555 "on conflict, fetch the existing registration" contract
	/// (spec.md §4.D, §8 "RegisterAccount called twice ... yields the same
	/// registration").
	pub async fn register_account(&self) -> ClResult<()> {
		if self.account.read().await.is_some() {
			return Ok(());
		}

		let contact: Vec<String> = self.config.contact.iter().map(|c| c.to_string()).collect();
		let contact_refs: Vec<&str> = contact.iter().map(String::as_str).collect();

		let created = Account::builder()?
			.create(
				&NewAccount { contact: &contact_refs, terms_of_service_agreed: true, only_return_existing: false },
				self.directory_url().to_string(),
				None,
			)
			.await;

		let (account, credentials) = match created {
			Ok(result) => result,
			Err(err) => {
				warn!(error = %err, "ACME account creation failed, retrying as an existing-account lookup");
				Account::builder()?
					.create(
						&NewAccount { contact: &contact_refs, terms_of_service_agreed: true, only_return_existing: true },
						self.directory_url().to_string(),
						None,
					)
					.await?
			}
		};

		*self.account.write().await = Some(RegisteredAccount(account));
		*self.credentials.write().await = Some(AcmeCredentials(credentials));
		Ok(())
	}

	/// Exposes the account key/registration for the caller to persist
	/// (spec.md §4.D `GetAccountKey`). Only populated once `RegisterAccount`
	/// has run in this process; a driver restored via `from_credentials`
	/// already has its key held by the caller and returns it back verbatim.
	pub async fn account_key(&self) -> ClResult<AcmeCredentials> {
		self.credentials
			.read()
			.await
			.clone()
			.ok_or_else(|| Error::StateError("no ACME account is registered yet".into()))
	}

	pub(crate) async fn ensure_account(&self) -> ClResult<()> {
		if self.account.read().await.is_some() {
			return Ok(());
		}
		self.register_account().await
	}
}

// vim: ts=4
