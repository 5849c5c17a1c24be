//! Parsing of single `scheme://credential@host:port?params#name` entries.

use crate::tables::Tables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub raw: String,
    pub credential: String,
    pub host: String,
    pub port: Option<u16>,
    /// Query parameters with lowercased keys, in order of appearance.
    pub params: Vec<(String, String)>,
    pub name: Option<String>,
}

impl ConfigEntry {
    /// Parse an entry that starts with `marker`. Returns `None` for anything
    /// without a credential and a host.
    pub fn parse(raw: &str, marker: &str) -> Option<Self> {
        let raw = raw.trim();
        let body = strip_prefix_ignore_case(raw, marker)?;

        let (body, name) = match body.split_once('#') {
            Some((body, name)) if !name.is_empty() => (body, Some(name.to_string())),
            Some((body, _)) => (body, None),
            None => (body, None),
        };
        let (authority, query) = body.split_once('?').unwrap_or((body, ""));
        let authority = authority.trim_end_matches('/');
        let (credential, host_port) = authority.rsplit_once('@')?;

        let (host, port) = split_host_port(host_port);
        if credential.is_empty() || host.is_empty() {
            return None;
        }

        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key.to_lowercase(), value.to_string())
            })
            .collect();

        Some(Self {
            raw: raw.to_string(),
            credential: credential.to_string(),
            host: host.to_lowercase(),
            port,
            params,
            name,
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Identity of the node behind this entry: credential plus public key, or
    /// credential plus host when no key is given.
    pub fn fingerprint(&self) -> String {
        let anchor = match self.param("pbk") {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => self.host.clone(),
        };
        format!("{}|{}", self.credential.to_lowercase(), anchor)
    }

    /// True when any `(key, value)` pair is present, compared case-insensitively.
    pub fn has_required_params(&self, required: &[(String, String)]) -> bool {
        required.iter().any(|(key, value)| {
            self.param(&key.to_lowercase())
                .is_some_and(|v| v.eq_ignore_ascii_case(value))
        })
    }

    /// Hostnames this entry routes through: the address, `sni` and `host`.
    pub fn routing_names(&self) -> Vec<String> {
        let mut names = vec![self.host.clone()];
        for key in ["sni", "host"] {
            if let Some(value) = self.param(key)
                && !value.is_empty()
            {
                names.push(value.to_lowercase());
            }
        }
        names
    }

    pub fn is_placeholder(&self, tables: &Tables) -> bool {
        let credential = self.credential.to_lowercase();
        tables
            .placeholder_credentials
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&credential))
            || tables
                .placeholder_hosts
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&self.host))
    }

    /// Distinct characters of the credential, ignoring `-` separators.
    pub fn credential_entropy(&self) -> usize {
        let mut chars: Vec<char> = self
            .credential
            .to_lowercase()
            .chars()
            .filter(|c| *c != '-')
            .collect();
        chars.sort_unstable();
        chars.dedup();
        chars.len()
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn split_host_port(host_port: &str) -> (&str, Option<u16>) {
    // [v6]:port
    if let Some(rest) = host_port.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
        return (host, port);
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (host_port, None),
        },
        None => (host_port, None),
    }
}
