//! Hostname resolution.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while resolving a target.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The system resolver returned an error.
    #[error("failed to resolve '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The lookup succeeded but returned no address.
    #[error("no addresses found for '{0}'")]
    NoAddresses(String),

    /// The lookup did not finish within the configured bound.
    #[error("resolving '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
}

/// Resolves a hostname to its current address set.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError>;
}

/// Resolver backed by the operating system (`getaddrinfo` via Tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError> {
        // IP literals need no lookup
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(BTreeSet::from([ip]));
        }

        let addrs = tokio::net::lookup_host(format!("{host}:0"))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        let ips: BTreeSet<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        if ips.is_empty() {
            return Err(ResolveError::NoAddresses(host.to_string()));
        }
        Ok(ips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let ips = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ips, BTreeSet::from([IpAddr::V4(Ipv4Addr::LOCALHOST)]));
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal() {
        let ips = SystemResolver.resolve("::1").await.unwrap();
        assert_eq!(ips, BTreeSet::from([IpAddr::V6(Ipv6Addr::LOCALHOST)]));
    }

    #[tokio::test]
    async fn test_resolve_invalid_host() {
        let result = SystemResolver.resolve("invalid host name.").await;
        assert!(result.is_err());
    }
}
