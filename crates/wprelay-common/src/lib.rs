use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_GRAPHQL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IMAGE_HOST: &str = "vacaylanka.atwebpages.com";
pub const DEFAULT_IMAGE_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required relay config field: {0}")]
    MissingField(&'static str),
    #[error("invalid relay config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Basic-auth pair for the GraphQL upstream. Only ever leaves the process as
/// an `Authorization` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredential {
    username: String,
    password: String,
}

impl UpstreamCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", B64.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Host names the image relay may fetch from. Hosts are stored trimmed and
/// lowercased; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    hosts: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts }
    }

    /// Parses a comma separated host list (`a.example, b.example`).
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.trim().to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }
}

/// Raw GraphQL upstream settings as loaded from CLI/ENV. Every field may be
/// absent; absence is reported per request, not at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphqlUpstreamSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl GraphqlUpstreamSettings {
    pub fn resolve(&self) -> Result<GraphqlUpstream, ConfigError> {
        let url = self
            .url
            .clone()
            .ok_or(ConfigError::MissingField("graphql_url"))?;
        let username = self
            .username
            .clone()
            .ok_or(ConfigError::MissingField("graphql_username"))?;
        let password = self
            .password
            .clone()
            .ok_or(ConfigError::MissingField("graphql_password"))?;
        Ok(GraphqlUpstream {
            url,
            credential: UpstreamCredential::new(username, password),
            timeout: self.timeout,
        })
    }

    /// Names of the fields that are unset, for the startup log.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.is_none() {
            missing.push("graphql_url");
        }
        if self.username.is_none() {
            missing.push("graphql_username");
        }
        if self.password.is_none() {
            missing.push("graphql_password");
        }
        missing
    }
}

impl fmt::Debug for GraphqlUpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphqlUpstreamSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphqlUpstream {
    pub url: String,
    pub credential: UpstreamCredential,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRelaySettings {
    pub allow_list: AllowList,
    pub user_agent: String,
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    pub graphql: GraphqlUpstreamSettings,
    pub image: ImageRelaySettings,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Optional layer used for merging relay config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
    pub graphql_url: Option<String>,
    pub graphql_username: Option<String>,
    pub graphql_password: Option<String>,
    pub graphql_timeout: Option<Duration>,
    pub image_allowed_hosts: Option<AllowList>,
}

impl RelayConfigPatch {
    pub fn overlay(&mut self, other: RelayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.graphql_url.is_some() {
            self.graphql_url = other.graphql_url;
        }
        if other.graphql_username.is_some() {
            self.graphql_username = other.graphql_username;
        }
        if other.graphql_password.is_some() {
            self.graphql_password = other.graphql_password;
        }
        if other.graphql_timeout.is_some() {
            self.graphql_timeout = other.graphql_timeout;
        }
        if other.image_allowed_hosts.is_some() {
            self.image_allowed_hosts = other.image_allowed_hosts;
        }
    }

    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let timeout = self.graphql_timeout.unwrap_or(DEFAULT_GRAPHQL_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "graphql_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        let allow_list = self
            .image_allowed_hosts
            .unwrap_or_else(|| AllowList::new([DEFAULT_IMAGE_HOST]));
        if allow_list.is_empty() {
            return Err(ConfigError::Invalid {
                field: "image_allowed_hosts",
                reason: "at least one host is required".to_string(),
            });
        }
        Ok(RelayConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            proxy: self.proxy,
            graphql: GraphqlUpstreamSettings {
                url: self.graphql_url,
                username: self.graphql_username,
                password: self.graphql_password,
                timeout,
            },
            image: ImageRelaySettings {
                allow_list,
                user_agent: DEFAULT_IMAGE_USER_AGENT.to_string(),
            },
        })
    }
}
