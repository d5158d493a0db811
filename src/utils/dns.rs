//! DNS utilities for outbound mail delivery
//!
//! MX lookup only: there is deliberately no A/AAAA fallback when a
//! domain has no MX records, since silently treating the domain itself
//! as a mail server masks DNS misconfiguration in the destination.

use crate::error::{MailError, Result};
use std::net::SocketAddr;
use tracing::{debug, info};
use trust_dns_resolver::config::*;
use trust_dns_resolver::TokioAsyncResolver;

/// Resolve MX records for `domain`, sorted by preference ascending, as
/// `host:25` strings. Errors (including "no MX records found") are
/// propagated rather than papered over.
pub async fn lookup_mx(domain: &str) -> Result<Vec<String>> {
    info!("looking up MX records for {}", domain);

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mx_lookup = resolver
        .mx_lookup(domain)
        .await
        .map_err(|e| MailError::DnsLookup(format!("MX lookup failed for {}: {}", domain, e)))?;

    let mut mx_records: Vec<(u16, String)> = mx_lookup
        .iter()
        .map(|mx| {
            let preference = mx.preference();
            let exchange = mx.exchange().to_string().trim_end_matches('.').to_string();
            (preference, exchange)
        })
        .collect();

    mx_records.sort_by_key(|(preference, _)| *preference);

    if mx_records.is_empty() {
        return Err(MailError::DnsLookup(format!(
            "no MX records found for {}",
            domain
        )));
    }

    for (preference, host) in &mx_records {
        debug!("  MX {} preference {}", host, preference);
    }

    Ok(mx_records
        .into_iter()
        .map(|(_, host)| format!("{}:25", host))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_socket_addr() {
        assert!("127.0.0.1:25".parse::<SocketAddr>().is_ok());
    }

    #[tokio::test]
    async fn lookup_mx_on_domain_with_no_mx_records_is_an_error() {
        let result = lookup_mx("nonexistent-domain-for-tests-12345.invalid").await;
        assert!(result.is_err());
    }
}
