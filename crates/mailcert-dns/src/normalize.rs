//! Hostname normalization shared between the DNS verifier and the Domain
//! Manager's DNS guide (spec.md §4.C, §4.F).

/// Returns everything after the first dot: `"mail.example.com" →
/// "example.com"`. Used to find the apex from a `mail.`-prefixed stored
/// domain name.
pub fn get_parent_domain(name: &str) -> Box<str> {
	match name.split_once('.') {
		Some((_, rest)) => rest.into(),
		None => name.into(),
	}
}

/// Returns the `mail.` subdomain of `name`, or `name` unchanged if it is
/// already `mail.`-prefixed.
pub fn get_mail_hostname(name: &str) -> Box<str> {
	if name.starts_with("mail.") {
		name.into()
	} else {
		format!("mail.{name}").into_boxed_str()
	}
}

/// The set of hostnames a domain's lifecycle actually checks against DNS,
/// derived from the `mail.`-prefix normalization rule (spec.md §4.C):
/// a `mail.`-prefixed stored name uses its parent for MX/TXT and itself for
/// A; an apex stored name uses itself for MX/TXT and `mail.<name>` for A.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainNames {
	/// The mail service apex: target of MX and `_infinimail.<apex>` TXT.
	pub apex: Box<str>,
	/// The host expected to carry the A record.
	pub mail_host: Box<str>,
}

impl DomainNames {
	pub fn for_domain(stored_name: &str) -> Self {
		if let Some(apex) = stored_name.strip_prefix("mail.") {
			DomainNames { apex: apex.into(), mail_host: stored_name.into() }
		} else {
			DomainNames { apex: stored_name.into(), mail_host: get_mail_hostname(stored_name) }
		}
	}

	pub fn txt_name(&self) -> Box<str> {
		format!("_infinimail.{}", self.apex).into_boxed_str()
	}
}

/// Strips a trailing root-zone dot and lowercases, for DNS value comparison
/// (spec.md §4.C: "host/value comparisons strip trailing dots and lowercase").
pub fn normalize_for_compare(s: &str) -> String {
	s.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parent_domain_strips_first_label() {
		assert_eq!(&*get_parent_domain("mail.example.com"), "example.com");
		// Documented-as-observed quirk (spec.md §9 Open Question 1): this is a
		// substring-after-first-dot operation, not a registrable-domain parse,
		// so a bare apex yields its TLD. Preserved verbatim, not "fixed".
		assert_eq!(&*get_parent_domain("example.com"), "com");
	}

	#[test]
	fn mail_hostname_is_idempotent() {
		assert_eq!(&*get_mail_hostname("example.com"), "mail.example.com");
		assert_eq!(&*get_mail_hostname("mail.example.com"), "mail.example.com");
	}

	#[test]
	fn domain_names_normalizes_mail_prefixed_storage() {
		let n = DomainNames::for_domain("mail.example.com");
		assert_eq!(&*n.apex, "example.com");
		assert_eq!(&*n.mail_host, "mail.example.com");
		assert_eq!(&*n.txt_name(), "_infinimail.example.com");
	}

	#[test]
	fn domain_names_normalizes_apex_storage() {
		let n = DomainNames::for_domain("example.com");
		assert_eq!(&*n.apex, "example.com");
		assert_eq!(&*n.mail_host, "mail.example.com");
	}

	#[test]
	fn compare_strips_dot_and_lowercases() {
		assert_eq!(normalize_for_compare("Mail.Example.COM."), "mail.example.com");
	}
}

// vim: ts=4
