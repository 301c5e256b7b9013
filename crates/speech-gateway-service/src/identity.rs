//! Caller identity resolution.
//!
//! Header extraction is transport-specific, so `resolve` takes a lookup
//! closure instead of a header map. The rate-limit identity and the
//! allow-list key are independent axes and are never merged.

use std::net::IpAddr;

/// Identity used when neither the trusted header nor a connection address
/// is available (e.g. in-process test transports).
const UNKNOWN_IDENTITY: &str = "unknown";

/// A resolved caller, attached to the request for handlers and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Key under which quota is tracked. Never empty.
    pub identity: String,
    /// Access key presented for allow-list checks, if any.
    pub access_key: Option<String>,
}

impl Caller {
    /// Access key suitable for logs: only a short prefix is kept.
    pub fn redacted_key(&self) -> Option<String> {
        self.access_key
            .as_deref()
            .map(|key| format!("{}***", key.chars().take(4).collect::<String>()))
    }
}

/// Derives caller identities from configured header names.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    ip_header: String,
    key_header: String,
}

impl IdentityResolver {
    pub fn new(ip_header: impl Into<String>, key_header: impl Into<String>) -> Self {
        Self {
            ip_header: ip_header.into().to_ascii_lowercase(),
            key_header: key_header.into().to_ascii_lowercase(),
        }
    }

    pub fn ip_header(&self) -> &str {
        &self.ip_header
    }

    pub fn key_header(&self) -> &str {
        &self.key_header
    }

    /// Resolves the caller from request headers and the peer address.
    ///
    /// The trusted IP header wins when present and non-empty. Proxies that
    /// append to a list (`a, b, c`) are handled by taking the first entry.
    pub fn resolve<'a>(
        &self,
        header: impl Fn(&str) -> Option<&'a str>,
        connection: Option<IpAddr>,
    ) -> Caller {
        let forwarded = header(&self.ip_header)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let identity = match (forwarded, connection) {
            (Some(value), _) => value.to_string(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => UNKNOWN_IDENTITY.to_string(),
        };

        let access_key = header(&self.key_header)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        Caller {
            identity,
            access_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(headers: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<&'a str> {
        move |name| headers.get(name).copied()
    }

    #[test]
    fn trusted_header_wins_over_connection() {
        let resolver = IdentityResolver::new("X-Real-IP", "x-api-key");
        let headers = HashMap::from([("x-real-ip", "203.0.113.7")]);
        let caller = resolver.resolve(lookup(&headers), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(caller.identity, "203.0.113.7");
        assert_eq!(caller.access_key, None);
    }

    #[test]
    fn empty_header_falls_back_to_connection() {
        let resolver = IdentityResolver::new("x-real-ip", "x-api-key");
        let headers = HashMap::from([("x-real-ip", "  ")]);
        let caller = resolver.resolve(lookup(&headers), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(caller.identity, "10.0.0.1");
    }

    #[test]
    fn forwarded_list_uses_first_hop() {
        let resolver = IdentityResolver::new("x-forwarded-for", "x-api-key");
        let headers = HashMap::from([("x-forwarded-for", "198.51.100.2, 10.0.0.3")]);
        let caller = resolver.resolve(lookup(&headers), None);
        assert_eq!(caller.identity, "198.51.100.2");
    }

    #[test]
    fn identity_is_never_empty() {
        let resolver = IdentityResolver::new("x-real-ip", "x-api-key");
        let headers = HashMap::new();
        let caller = resolver.resolve(lookup(&headers), None);
        assert_eq!(caller.identity, UNKNOWN_IDENTITY);
    }

    #[test]
    fn access_key_is_read_independently() {
        let resolver = IdentityResolver::new("x-real-ip", "x-api-key");
        let headers = HashMap::from([("x-api-key", "secret-key-1")]);
        let caller = resolver.resolve(lookup(&headers), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(caller.identity, "10.0.0.1");
        assert_eq!(caller.access_key.as_deref(), Some("secret-key-1"));
        assert_eq!(caller.redacted_key().as_deref(), Some("secr***"));
    }
}
