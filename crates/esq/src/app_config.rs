//! 🔧 App Configuration: TOML and `ESQ_*` env vars in, a ready-to-open [`Connection`] out.
//!
//! 🏗️ Figment does the merging, serde does the shapes, and
//! [`ConnectionConfig::into_connection`] does the judging.
//!
//! ```toml
//! [connection]
//! dsl_version = 7
//! autodetect_cluster = false
//! username = "elastic"
//! password = "changeme"
//!
//! [[connection.nodes]]
//! http_address = "es-1.internal:9200"
//! protocol = "https"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::common::DslVersion;
use crate::connection::{Connection, Credentials, Node, Protocol};
use crate::error::{Error, Result};

/// 📦 Everything the binary needs to know before it can talk to a cluster.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// 📡 One cluster, as configured.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,
    /// Ask the first node for the rest of the cluster on open.
    #[serde(default = "default_true")]
    pub autodetect_cluster: bool,
    /// `"http"` or `"https"`; used by nodes that do not say, and by discovered nodes.
    #[serde(default)]
    pub default_protocol: Option<String>,
    #[serde(default)]
    pub dsl_version: DslVersion,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

/// 🗺️ One seed node. Credentials here beat the connection-wide ones.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub http_address: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_nodes() -> Vec<NodeConfig> {
    vec![NodeConfig {
        http_address: "inet[/127.0.0.1:9200]".into(),
        ..NodeConfig::default()
    }]
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            autodetect_cluster: true,
            default_protocol: None,
            dsl_version: DslVersion::default(),
            username: None,
            password: None,
            connect_timeout_secs: None,
            read_timeout_secs: None,
        }
    }
}

fn credentials(username: &Option<String>, password: &Option<String>) -> Option<Credentials> {
    if username.is_none() && password.is_none() {
        return None;
    }
    Some(Credentials {
        username: username.clone(),
        password: password.clone(),
    })
}

impl ConnectionConfig {
    /// 🏗️ Validate and build a closed [`Connection`].
    ///
    /// Every node needs an address and a protocol the transport speaks. Half-filled
    /// credentials are let through here and refused at request time, where the node is known.
    pub fn into_connection(self) -> Result<Connection> {
        let default_protocol = match self.default_protocol.as_deref() {
            Some(protocol) => protocol.parse::<Protocol>()?,
            None => Protocol::Http,
        };
        if self.nodes.is_empty() {
            return Err(Error::configuration(
                "Elasticsearch needs at least one node to operate.",
            ));
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.http_address.trim().is_empty() {
                return Err(Error::configuration(
                    "Elasticsearch node needs at least a http_address configured.",
                ));
            }
            let protocol = match node.protocol.as_deref() {
                Some(protocol) => protocol.parse::<Protocol>()?,
                None => default_protocol,
            };
            let mut built = Node::new(node.http_address.trim()).with_protocol(protocol);
            built.auth = credentials(&node.username, &node.password);
            nodes.push(built);
        }

        let mut connection = Connection::new(nodes)
            .with_autodetect(self.autodetect_cluster)
            .with_default_protocol(default_protocol)
            .with_dsl_version(self.dsl_version);
        if let Some(auth) = credentials(&self.username, &self.password) {
            connection = connection.with_auth(auth);
        }
        if let Some(secs) = self.connect_timeout_secs {
            connection = connection.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.read_timeout_secs {
            connection = connection.with_read_timeout(Duration::from_secs(secs));
        }
        Ok(connection)
    }
}

/// 🚀 Load the config: `ESQ_*` env vars, plus a TOML file when one is given. TOML wins.
///
/// Nested keys use a double underscore: `ESQ_CONNECTION__DSL_VERSION=7`.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("ESQ_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESQ_*).",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESQ_*). \
                 No file was provided, so this one is all on the environment."
            .to_string(),
    };
    config.extract().context(context_msg)
}
