//! 🗺️ Nodes: where the cluster lives, and how to knock on its door.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// 🔒 The two schemes a node may speak. Anything else is a configuration typo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(Error::configuration(
                "Valid node protocol settings are \"http\" and \"https\".",
            )),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 🔒 Basic-auth credentials. Both halves or neither; half a login is a config error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// ✅ Hand back `(username, password)` or explain which half went missing.
    pub fn pair(&self) -> Result<(&str, &str)> {
        let username = self
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::configuration("Username is required to use authentication"))?;
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::configuration("Password is required to use authentication"))?;
        Ok((username, password))
    }
}

/// 📡 One addressable cluster endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Raw address as configured or published: `host:port`, `inet[/host:port]`, `name/ip:port`.
    pub http_address: String,
    pub protocol: Protocol,
    pub auth: Option<Credentials>,
}

impl Node {
    pub fn new(http_address: impl Into<String>) -> Self {
        Self {
            http_address: http_address.into(),
            protocol: Protocol::default(),
            auth: None,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Credentials::new(username, password));
        self
    }

    /// 🧹 `host:port`, with the legacy `inet[...]` wrapper and any `name/` prefix scraped off.
    pub fn host(&self) -> &str {
        let mut host = self.http_address.as_str();
        if let Some(inner) = host.strip_prefix("inet[").and_then(|h| h.strip_suffix(']')) {
            host = inner;
        }
        match host.rfind('/') {
            Some(pos) => &host[pos + 1..],
            None => host,
        }
    }

    /// `scheme://host:port`, no trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host())
    }
}

/// 🔍 Turn a `GET /_nodes/_all/http` reply into nodes.
///
/// Nodes that do not publish an HTTP address are dropped; they exist, but not for us.
pub fn nodes_from_discovery(response: &Value, protocol: Protocol) -> Vec<Node> {
    let Some(nodes) = response.get("nodes").and_then(Value::as_object) else {
        return Vec::new();
    };
    nodes
        .values()
        .filter_map(|info| {
            info.pointer("/http/publish_address")
                .and_then(Value::as_str)
                .map(|address| Node::new(address).with_protocol(protocol))
        })
        .collect()
}
