//! Multi-resolver TXT pre-check used by the ACME driver before submitting a
//! DNS-01 challenge (spec.md §4.C, §4.D, §6): queries Google, Cloudflare and
//! OpenDNS and succeeds if *any* of them already sees the expected value.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::TokioResolver;

use crate::normalize::normalize_for_compare;

/// Public resolver IPs named in spec.md §6: Google, Cloudflare, OpenDNS.
pub const DEFAULT_PUBLIC_RESOLVERS: [IpAddr; 3] = [
	IpAddr::V4(std::net::Ipv4Addr::new(8, 8, 8, 8)),
	IpAddr::V4(std::net::Ipv4Addr::new(1, 1, 1, 1)),
	IpAddr::V4(std::net::Ipv4Addr::new(208, 67, 222, 222)),
];

/// One resolver per configured nameserver IP (generalizing the teacher's
/// "13 root servers, full recursion" shape to "one resolver per public
/// nameserver, first match wins").
fn resolver_for(ip: IpAddr) -> TokioResolver {
	let mut config = ResolverConfig::new();
	config.add_name_server(NameServerConfig::new(SocketAddr::new(ip, 53), Protocol::Udp));
	TokioResolver::builder_with_config(config, TokioConnectionProvider::default()).build()
}

/// Queries every resolver in `resolvers` for a TXT record at `name` and
/// returns true as soon as any one of them returns the expected value.
/// Each resolver gets a 10s dial timeout (spec.md §6).
pub async fn any_public_resolver_sees(name: &str, expected: &str, resolvers: &[IpAddr]) -> bool {
	let expected_norm = normalize_for_compare(expected);
	for ip in resolvers {
		let resolver = resolver_for(*ip);
		let lookup = tokio::time::timeout(Duration::from_secs(10), resolver.lookup(name, RecordType::TXT)).await;
		let Ok(Ok(lookup)) = lookup else { continue };
		let matched = lookup
			.record_iter()
			.filter_map(|r| r.data().as_txt())
			.map(|txt| txt.iter().map(|b| String::from_utf8_lossy(b)).collect::<String>())
			.any(|v| normalize_for_compare(&v) == expected_norm);
		if matched {
			return true;
		}
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_resolvers_match_spec_list() {
		assert_eq!(DEFAULT_PUBLIC_RESOLVERS.len(), 3);
		assert!(DEFAULT_PUBLIC_RESOLVERS.contains(&IpAddr::V4(std::net::Ipv4Addr::new(8, 8, 8, 8))));
	}
}

// vim: ts=4
