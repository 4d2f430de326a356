//! DNS-01 challenge issuance and completion (spec.md §4.D `GetDNSChallenge`,
//! `CompleteDNSChallenge`).

use std::time::Duration;

use futures::StreamExt;
use instant_acme::{AuthorizationStatus, ChallengeType, Identifier, NewOrder, OrderStatus, RetryPolicy};
use mailcert_dns::{any_public_resolver_sees, DEFAULT_PUBLIC_RESOLVERS};
use mailcert_types::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::{AcmeDriver, InFlightOrder, AUTHORIZATION_POLL_CEILING, AUTHORIZATION_POLL_INTERVAL};

/// The result of `GetDNSChallenge`: the challenge token plus the exact TXT
/// value the caller must publish at `_acme-challenge.<domain>`.
#[derive(Clone, Debug)]
pub struct DnsChallenge {
	pub token: Box<str>,
	pub txt_record: Box<str>,
}

impl AcmeDriver {
	/// Registers if needed, opens a fresh order for `domain`, and returns
	/// the DNS-01 challenge to publish. Fails with a `no dns-01` error if
	/// the CA doesn't offer that challenge type for this authorization
	/// (spec.md §4.D).
	pub async fn get_dns_challenge(&self, domain: &str) -> ClResult<DnsChallenge> {
		self.ensure_account().await?;

		let account_guard = self.account.read().await;
		let account = &account_guard.as_ref().ok_or_else(|| Error::StateError("account not registered".into()))?.0;

		let identifiers = [Identifier::Dns(domain.to_string())];
		let mut order = account.new_order(&NewOrder::new(&identifiers)).await?;

		let mut authorizations = order.authorizations();
		let mut challenge = None;
		while let Some(result) = authorizations.next().await {
			let mut authz = result?;
			if matches!(authz.status, AuthorizationStatus::Valid) {
				continue;
			}
			if let Some(found) = authz.challenge(ChallengeType::Dns01) {
				let token: Box<str> = found.token.clone().into();
				let dns_value: Box<str> = found.key_authorization().dns_value().into();
				challenge = Some(DnsChallenge { token, txt_record: dns_value });
				break;
			}
		}
		drop(authorizations);
		drop(account_guard);

		let challenge = challenge.ok_or_else(|| Error::AcmeError("no dns-01".into()))?;

		self.orders.lock().insert(domain.into(), InFlightOrder { order, challenge: challenge.clone() });

		Ok(challenge)
	}

	/// Performs a best-effort public-resolver pre-check, sleeps for the
	/// configured propagation delay (cancellable), re-checks, and on success
	/// accepts the challenge and polls the authorization to completion. The
	/// pre-check failure path is **fatal**, not a warning (spec.md §9 Open
	/// Question 3: implement the newer semantics).
	pub async fn complete_dns_challenge(&self, domain: &str, cancel: &CancellationToken) -> ClResult<()> {
		let mut in_flight = self
			.orders
			.lock()
			.remove(domain)
			.ok_or_else(|| Error::StateError(format!("no in-flight ACME order for {domain}")))?;

		let record_name = format!("_acme-challenge.{domain}");
		let expected = in_flight.challenge.txt_record.to_string();

		let pre_check = any_public_resolver_sees(&record_name, &expected, &DEFAULT_PUBLIC_RESOLVERS).await;
		if !pre_check {
			debug!(domain, "ACME DNS-01 pre-check missed the expected TXT value, waiting for propagation anyway");
		}

		if sleep_cancellable(self.propagation_delay(), cancel).await.is_err() {
			self.orders.lock().insert(domain.into(), in_flight);
			return Err(Error::Cancelled);
		}

		if !any_public_resolver_sees(&record_name, &expected, &DEFAULT_PUBLIC_RESOLVERS).await {
			// Newer (fatal) semantics: do not submit the challenge if the
			// public resolvers still disagree (spec.md §9 Open Question 3).
			return Err(Error::DnsFailure(format!(
				"public resolvers do not see the expected TXT value at {record_name}; publish \
				 \"{expected}\" and retry"
			)));
		}

		accept_challenge(&mut in_flight, domain).await?;
		if let Err(err) = poll_authorization_to_valid(&mut in_flight, cancel).await {
			// A cancelled poll is retryable from the same in-flight order;
			// any other failure (invalid, timeout) is terminal and the
			// caller must request a fresh challenge.
			if matches!(err, Error::Cancelled) {
				self.orders.lock().insert(domain.into(), in_flight);
			}
			return Err(err);
		}

		let retry_policy = RetryPolicy::new().initial_delay(Duration::from_secs(1)).backoff(1.5).timeout(Duration::from_secs(60));
		let status = in_flight.order.poll_ready(&retry_policy).await?;
		if status != OrderStatus::Ready {
			return Err(Error::AcmeError(format!("order not ready after challenge validation (status={status:?})")));
		}

		self.orders.lock().insert(domain.into(), in_flight);
		Ok(())
	}
}

async fn accept_challenge(in_flight: &mut InFlightOrder, domain: &str) -> ClResult<()> {
	let mut authorizations = in_flight.order.authorizations();
	while let Some(result) = authorizations.next().await {
		let mut authz = result?;
		if matches!(authz.status, AuthorizationStatus::Valid) {
			continue;
		}
		if let Some(mut challenge) = authz.challenge(ChallengeType::Dns01) {
			debug!(domain, "submitting ACME DNS-01 challenge as ready");
			challenge.set_ready().await?;
		}
	}
	Ok(())
}

/// Polls the authorization every `AUTHORIZATION_POLL_INTERVAL` up to
/// `AUTHORIZATION_POLL_CEILING`, interpreting `valid`/`invalid`/`pending`/
/// `processing`/terminal states per spec.md §4.D.
async fn poll_authorization_to_valid(in_flight: &mut InFlightOrder, cancel: &CancellationToken) -> ClResult<()> {
	let start = tokio_time_now();
	loop {
		let mut authorizations = in_flight.order.authorizations();
		let mut all_valid = true;
		while let Some(result) = authorizations.next().await {
			let authz = result?;
			match authz.status {
				AuthorizationStatus::Valid => {}
				AuthorizationStatus::Pending | AuthorizationStatus::Processing => all_valid = false,
				AuthorizationStatus::Invalid => {
					let detail = authz
						.challenges
						.iter()
						.find_map(|c| c.error.as_ref())
						.and_then(|e| e.detail.clone())
						.unwrap_or_else(|| "no detail provided by CA".to_string());
					return Err(Error::AcmeError(format!("authorization invalid: {detail}")));
				}
				other => {
					return Err(Error::AcmeError(format!("authorization reached terminal state {other:?}")));
				}
			}
		}
		drop(authorizations);

		if all_valid {
			return Ok(());
		}

		if start.elapsed() > AUTHORIZATION_POLL_CEILING {
			return Err(Error::Timeout("authorization polling exceeded the 5 minute ceiling".into()));
		}

		if sleep_cancellable(AUTHORIZATION_POLL_INTERVAL, cancel).await.is_err() {
			return Err(Error::Cancelled);
		}
	}
}

fn tokio_time_now() -> std::time::Instant {
	std::time::Instant::now()
}

/// Sleeps for `duration`, returning `Err(())` if `cancel` fires first.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> Result<(), ()> {
	tokio::select! {
		() = tokio::time::sleep(duration) => Ok(()),
		() = cancel.cancelled() => Err(()),
	}
}

// vim: ts=4
