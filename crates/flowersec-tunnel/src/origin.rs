//! Origin allow-list matching for the WebSocket upgrade.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    /// Match the whole `Origin` header value byte-for-byte.
    Exact(String),
    /// Match `scheme://host` with any port (or no port).
    Hostname { scheme: String, host: String },
    /// Match `scheme://host:port` exactly.
    HostnamePort { scheme: String, host: String, port: u16 },
    /// Match `scheme://<anything>.suffix`, e.g. `*.example.com`.
    Wildcard { scheme: String, suffix: String },
    /// The literal string `null`, sent by sandboxed/file-origin clients.
    Null,
}

/// A set of allowed `Origin` header values, plus policy for connections
/// that omit the header entirely.
#[derive(Debug, Clone)]
pub struct OriginAllowList {
    rules: Vec<Rule>,
    allow_missing_origin: bool,
}

impl OriginAllowList {
    pub fn new(allow_missing_origin: bool) -> Self {
        Self { rules: Vec::new(), allow_missing_origin }
    }

    /// Add one allow-list entry. Accepts:
    /// - `null` (the literal JS sandboxed-origin string)
    /// - `scheme://*.suffix` (wildcard subdomain)
    /// - `scheme://host:port` (exact host and port)
    /// - `scheme://host` (any port)
    /// - anything else, matched byte-for-byte against the raw header
    pub fn allow(mut self, pattern: &str) -> Self {
        self.rules.push(parse_rule(pattern));
        self
    }

    /// Decide whether `origin` (the raw `Origin` header value, if the
    /// request carried one) is allowed to upgrade.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return self.allow_missing_origin;
        };
        self.rules.iter().any(|rule| rule_matches(rule, origin))
    }
}

fn parse_rule(pattern: &str) -> Rule {
    if pattern == "null" {
        return Rule::Null;
    }
    let Some((scheme, rest)) = pattern.split_once("://") else {
        return Rule::Exact(pattern.to_string());
    };
    if let Some(suffix) = rest.strip_prefix("*.") {
        return Rule::Wildcard { scheme: scheme.to_string(), suffix: suffix.to_string() };
    }
    match rest.split_once(':') {
        Some((host, port_str)) => match port_str.parse::<u16>() {
            Ok(port) => Rule::HostnamePort { scheme: scheme.to_string(), host: host.to_string(), port },
            Err(_) => Rule::Exact(pattern.to_string()),
        },
        None => Rule::Hostname { scheme: scheme.to_string(), host: rest.to_string() },
    }
}

fn rule_matches(rule: &Rule, origin: &str) -> bool {
    match rule {
        Rule::Null => origin == "null",
        Rule::Exact(exact) => origin == exact,
        Rule::Hostname { scheme, host } => {
            let Some(rest) = origin.strip_prefix(scheme).and_then(|r| r.strip_prefix("://")) else {
                return false;
            };
            let host_part = rest.split_once(':').map(|(h, _)| h).unwrap_or(rest);
            host_part == host
        }
        Rule::HostnamePort { scheme, host, port } => {
            origin == format!("{scheme}://{host}:{port}")
        }
        Rule::Wildcard { scheme, suffix } => {
            let Some(rest) = origin.strip_prefix(scheme).and_then(|r| r.strip_prefix("://")) else {
                return false;
            };
            let host_part = rest.split_once(':').map(|(h, _)| h).unwrap_or(rest);
            host_part != *suffix
                && host_part.ends_with(suffix.as_str())
                && host_part[..host_part.len() - suffix.len()].ends_with('.')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let list = OriginAllowList::new(false).allow("https://app.example.com");
        assert!(list.allows(Some("https://app.example.com")));
        assert!(!list.allows(Some("https://other.example.com")));
    }

    #[test]
    fn hostname_matches_any_port() {
        let list = OriginAllowList::new(false).allow("http://localhost");
        assert!(list.allows(Some("http://localhost:5173")));
        assert!(list.allows(Some("http://localhost")));
        assert!(!list.allows(Some("https://localhost:5173")));
    }

    #[test]
    fn hostname_port_requires_exact_port() {
        let list = OriginAllowList::new(false).allow("http://localhost:8080");
        assert!(list.allows(Some("http://localhost:8080")));
        assert!(!list.allows(Some("http://localhost:8081")));
    }

    #[test]
    fn wildcard_matches_subdomains_only() {
        let list = OriginAllowList::new(false).allow("https://*.example.com");
        assert!(list.allows(Some("https://a.example.com")));
        assert!(list.allows(Some("https://a.b.example.com")));
        assert!(!list.allows(Some("https://example.com")));
        assert!(!list.allows(Some("https://evilexample.com")));
    }

    #[test]
    fn null_literal_matches_only_null() {
        let list = OriginAllowList::new(false).allow("null");
        assert!(list.allows(Some("null")));
        assert!(!list.allows(Some("https://example.com")));
    }

    #[test]
    fn missing_origin_follows_policy() {
        let permissive = OriginAllowList::new(true);
        let strict = OriginAllowList::new(false);
        assert!(permissive.allows(None));
        assert!(!strict.allows(None));
    }
}
