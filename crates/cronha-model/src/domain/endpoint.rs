use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Network address of a coordination-store node or a discovery node.
///
/// Parsed from `host:port`. IPv6 hosts are bracketed: `[::1]:6379`.
/// The legacy `{::1}:6379` form is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 6379)
    }
}

impl FromStr for Endpoint {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidEndpoint(s.to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .or_else(|| host.strip_prefix('{').and_then(|h| h.strip_suffix('}')))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ModelError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Endpoint;

    #[test]
    fn parses_host_and_port() {
        let e: Endpoint = "redis.internal:6380".parse().unwrap();
        assert_eq!(e.host(), "redis.internal");
        assert_eq!(e.port(), 6380);
    }

    #[test]
    fn parses_bracketed_ipv6() {
        for input in ["[::1]:26379", "{::1}:26379"] {
            let e: Endpoint = input.parse().unwrap();
            assert_eq!(e.host(), "::1", "input {input}");
            assert_eq!(e.port(), 26379);
        }
    }

    #[test]
    fn display_brackets_ipv6_only() {
        assert_eq!(Endpoint::new("::1", 1).to_string(), "[::1]:1");
        assert_eq!(Endpoint::new("10.0.0.1", 6379).to_string(), "10.0.0.1:6379");
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "localhost", ":6379", "host:", "host:notaport", "host:70000"] {
            assert!(
                input.parse::<Endpoint>().is_err(),
                "expected error for {input:?}"
            );
        }
    }

    #[test]
    fn deserializes_from_plain_string() {
        let e: Endpoint = serde_json::from_str(r#""127.0.0.1:6379""#).unwrap();
        assert_eq!(e, Endpoint::default());
    }
}
