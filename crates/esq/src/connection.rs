//! 📡 THE CONNECTION: node list, active node, and the one door every request walks through.
//!
//! 🧠 Knowledge graph:
//! - Lifecycle is `Closed → Open`. Open means: a `reqwest::Client` exists and exactly one
//!   node is active. Closed means neither. `close()` is idempotent and `Drop` calls it.
//! - Opening is two phases: [`Connection::resolve_nodes`] (optional cluster discovery,
//!   returns a fresh node list) then a [`NodeSelector`] pick. Discovery failure aborts the
//!   open and the half-built client is dropped on the way out.
//! - [`Connection::request`] is the single execution boundary. Observers hook in there.
//! - No retries. No failover. A failed request fails; reopen if you want another node.
//!
//! ⚠️ `&mut self` everywhere that touches the active node or the client. One connection per
//! worker; the borrow checker will hold you to it.

pub mod node;
pub mod reply;
pub mod selector;

use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName};
use url::Url;
use tracing::{debug, info};

pub use node::{Credentials, Node, Protocol, nodes_from_discovery};
pub use reply::{RawResponse, Reply, classify};
pub use selector::{FixedNodeSelector, NodeSelector, RandomNodeSelector};

use crate::bulk::BulkCommand;
use crate::command::Command;
use crate::common::{DslVersion, Options, PathSegment, build_url};
use crate::compiler::{CompiledQuery, QueryBuilder};
use crate::error::{Error, Result};
use crate::path;
use crate::profiler::{Outcome, RequestInfo, RequestObserver};

/// 📦 A request body plus the content type it travels under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    text: String,
    content_type: &'static str,
}

impl Body {
    /// 📦 Already-encoded JSON text, sent as `application/json`.
    pub fn json(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            content_type: "application/json",
        }
    }

    /// Bulk bodies: one JSON document per line.
    pub fn ndjson(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            content_type: "application/x-ndjson",
        }
    }

    /// The text as it will go over the wire.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Size in bytes; this is what [`RequestInfo::body_bytes`] reports.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// 📡 A handle on one cluster.
pub struct Connection {
    nodes: Vec<Node>,
    active_node: Option<usize>,
    autodetect_cluster: bool,
    default_protocol: Protocol,
    auth: Option<Credentials>,
    dsl_version: DslVersion,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    client: Option<reqwest::Client>,
    selector: Box<dyn NodeSelector>,
    observer: Option<Box<dyn RequestObserver>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- selector and observer are trait objects; they keep their secrets
        f.debug_struct("Connection")
            .field("nodes", &self.nodes)
            .field("active_node", &self.active_node)
            .field("autodetect_cluster", &self.autodetect_cluster)
            .field("dsl_version", &self.dsl_version)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(vec![Node::new("inet[/127.0.0.1:9200]")])
    }
}

impl Connection {
    /// 🚀 A closed connection over these nodes. Autodetection is on, as it is for a real cluster.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            active_node: None,
            autodetect_cluster: true,
            default_protocol: Protocol::Http,
            auth: None,
            dsl_version: DslVersion::default(),
            connect_timeout: None,
            read_timeout: None,
            client: None,
            selector: Box::new(RandomNodeSelector::new()),
            observer: None,
        }
    }

    /// 🔍 With autodetection on, `open` asks the first node for the whole cluster's
    /// HTTP addresses and uses those instead of the configured list.
    pub fn with_autodetect(mut self, enabled: bool) -> Self {
        self.autodetect_cluster = enabled;
        self
    }

    /// 🔐 Protocol for nodes that were discovered rather than configured.
    pub fn with_default_protocol(mut self, protocol: Protocol) -> Self {
        self.default_protocol = protocol;
        self
    }

    /// 🔒 Connection-wide credentials; a node's own credentials still take priority.
    pub fn with_auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    /// 🧮 Which query DSL to compile for. `6` and below still speak mapping types.
    pub fn with_dsl_version(mut self, version: impl Into<DslVersion>) -> Self {
        self.dsl_version = version.into();
        self
    }

    /// ⏱️ How long to wait for the TCP handshake. Takes effect on the next `open`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// ⏱️ Cap on a whole request, first byte to last. Takes effect on the next `open`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// 🎲 How `open` picks the active node. Random unless told otherwise.
    pub fn with_selector(mut self, selector: impl NodeSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// 🔔 Install (or replace) the start/stop hooks around every request.
    pub fn set_observer(&mut self, observer: impl RequestObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// 🔕 Requests go untimed from here on.
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// 🧮 The DSL version every command built from this connection uses.
    pub fn dsl_version(&self) -> DslVersion {
        self.dsl_version
    }

    /// 🗺️ Configured nodes before `open`; after it, the ones actually chosen from.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// 🔌 Open and holding a client.
    pub fn is_active(&self) -> bool {
        self.active_node.is_some()
    }

    /// 🎯 The node requests go to, once open.
    pub fn active_node(&self) -> Option<&Node> {
        self.active_node.and_then(|i| self.nodes.get(i))
    }

    /// 🚪 Open: build the client, maybe discover the cluster, pick a node. No-op when open.
    pub async fn open(&mut self) -> Result<()> {
        if self.active_node.is_some() {
            return Ok(());
        }
        if self.nodes.is_empty() {
            return Err(Error::configuration(
                "Elasticsearch needs at least one node to operate.",
            ));
        }

        let client = self.build_client()?;
        // -- if discovery bails, `client` drops right here and the handle is released
        let live_nodes = self.resolve_nodes(&client).await?;
        // -- a selector that overshoots is clamped to the last node
        let index = self.selector.select(live_nodes.len()).min(live_nodes.len() - 1);

        self.nodes = live_nodes;
        self.active_node = Some(index);
        self.client = Some(client);
        info!(
            "🔌 Connection open, active node {} of {}: {}",
            index + 1,
            self.nodes.len(),
            self.nodes[index].base_url()
        );
        Ok(())
    }

    /// 🗑️ Release the client and forget the active node. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.active_node.take().is_some() {
            info!("🔌 Connection closed");
        }
        self.client = None;
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// 🔍 Phase one of opening: the nodes we will actually choose from.
    ///
    /// Without autodetection that is the configured list. With it, the first configured node
    /// is asked for the cluster's published HTTP addresses and the answer replaces the list.
    pub async fn resolve_nodes(&self, client: &reqwest::Client) -> Result<Vec<Node>> {
        if !self.autodetect_cluster {
            return Ok(self.nodes.clone());
        }
        let Some(seed) = self.nodes.first() else {
            return Err(Error::configuration(
                "Elasticsearch needs at least one node to operate.",
            ));
        };
        self.discover_nodes(client, seed).await
    }

    /// 🗺️ Ask `seed` for every node that publishes an HTTP address.
    ///
    /// Discovered nodes speak the connection's default protocol and carry no node-level auth.
    pub async fn discover_nodes(&self, client: &reqwest::Client, seed: &Node) -> Result<Vec<Node>> {
        let url = build_url(&seed.base_url(), &path!["_nodes", "_all", "http"], &Options::new())?;
        let auth = self.credentials_for(seed)?;
        debug!("🔍 Discovering cluster nodes via {url}");
        let reply = send(client, Method::GET, url, None, false, auth).await?;

        let discovered = match reply {
            Reply::Json(ref response) => nodes_from_discovery(response, self.default_protocol),
            _ => Vec::new(),
        };
        if discovered.is_empty() {
            return Err(Error::configuration(
                "Cluster autodetection did not find any active node. Make sure a GET /_nodes \
                 request on the hosts defined in the config returns the \"publish_address\" \
                 field for each node.",
            ));
        }
        info!("🔍 Cluster autodetection found {} node(s)", discovered.len());
        Ok(discovered)
    }

    fn credentials_for<'a>(&'a self, node: &'a Node) -> Result<Option<(&'a str, &'a str)>> {
        node.auth
            .as_ref()
            .or(self.auth.as_ref())
            .map(Credentials::pair)
            .transpose()
    }

    /// 📡 Execute one request against the active node, opening lazily.
    ///
    /// `path` segments are percent-encoded and joined with `/`; `options` become the query
    /// string. HEAD requests never carry a body. `raw` keeps the body as text.
    pub async fn request(
        &mut self,
        method: Method,
        path: &[PathSegment],
        options: &Options,
        body: Option<Body>,
        raw: bool,
    ) -> Result<Reply> {
        self.open().await?;
        let url = self.url_for(path, options)?;
        let Some(node) = self.active_node() else {
            return Err(Error::configuration("No active Elasticsearch node."));
        };
        let auth = self
            .credentials_for(node)?
            .map(|(u, p)| (u.to_string(), p.to_string()));
        let Some(client) = self.client.clone() else {
            return Err(Error::configuration("Connection has no transport handle."));
        };

        // -- HEAD never carries a body, whatever the caller passed
        let body = if method == Method::HEAD { None } else { body };
        let info = RequestInfo {
            method: method.to_string(),
            url: url.to_string(),
            body_bytes: body.as_ref().map_or(0, Body::len),
        };

        if let Some(observer) = self.observer.as_mut() {
            observer.request_started(&info);
        }
        let started = Instant::now();
        let result = send(
            &client,
            method,
            url,
            body,
            raw,
            auth.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
        )
        .await;
        if let Some(observer) = self.observer.as_mut() {
            let outcome = match &result {
                Ok(Reply::NotFound) => Outcome::NotFound,
                Ok(_) => Outcome::Success,
                Err(err) => Outcome::Failed(err.to_string()),
            };
            observer.request_finished(&info, started.elapsed(), &outcome);
        }
        result
    }

    fn url_for(&self, path: &[PathSegment], options: &Options) -> Result<Url> {
        let node = self
            .active_node()
            .ok_or_else(|| Error::configuration("No active Elasticsearch node."))?;
        build_url(&node.base_url(), path, options)
    }

    // ===== 📡 verb helpers =====
    // -- thin wrappers over `request`; none of them ask for a raw body

    /// GET, body allowed. Search sends its query this way.
    pub async fn get(&mut self, path: &[PathSegment], options: &Options, body: Option<Body>) -> Result<Reply> {
        self.request(Method::GET, path, options, body, false).await
    }

    /// HEAD. A 404 is [`Reply::NotFound`], a 2xx is [`Reply::Found`].
    pub async fn head(&mut self, path: &[PathSegment], options: &Options) -> Result<Reply> {
        self.request(Method::HEAD, path, options, None, false).await
    }

    /// POST.
    pub async fn post(&mut self, path: &[PathSegment], options: &Options, body: Option<Body>) -> Result<Reply> {
        self.request(Method::POST, path, options, body, false).await
    }

    /// PUT.
    pub async fn put(&mut self, path: &[PathSegment], options: &Options, body: Option<Body>) -> Result<Reply> {
        self.request(Method::PUT, path, options, body, false).await
    }

    pub async fn delete(&mut self, path: &[PathSegment], options: &Options, body: Option<Body>) -> Result<Reply> {
        self.request(Method::DELETE, path, options, body, false).await
    }

    /// `GET /`: name, cluster and version of the active node.
    pub async fn node_info(&mut self) -> Result<Reply> {
        self.get(&[], &Options::new(), None).await
    }

    /// 🗺️ `GET /_cluster/state`. Big on large clusters.
    pub async fn cluster_state(&mut self) -> Result<Reply> {
        self.get(&path!["_cluster", "state"], &Options::new(), None).await
    }

    /// 🧮 The compiler, configured for this cluster's DSL version.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.dsl_version)
    }

    /// 🏗️ An empty command for admin and document operations. Opens the connection.
    pub async fn create_command(&mut self) -> Result<Command<'_>> {
        self.open().await?;
        Ok(Command::new(self))
    }

    /// 🏗️ A command primed with a compiled query. Opens the connection.
    pub async fn create_command_for(&mut self, compiled: CompiledQuery) -> Result<Command<'_>> {
        self.open().await?;
        Ok(Command::from_compiled(self, compiled))
    }

    /// 📦 An empty bulk batch. Opens the connection.
    pub async fn create_bulk_command(&mut self) -> Result<BulkCommand<'_>> {
        self.open().await?;
        Ok(BulkCommand::new(self))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// 🚀 One HTTP exchange, classified.
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    body: Option<Body>,
    raw: bool,
    auth: Option<(&str, &str)>,
) -> Result<Reply> {
    let is_head = method == Method::HEAD;
    debug!(
        "📡 {method} {url} ({} body bytes)",
        body.as_ref().map_or(0, Body::len)
    );

    let content_type = body.as_ref().map_or("application/json", |b| b.content_type);
    let mut request = client
        .request(method, url)
        .header(CONTENT_TYPE, content_type);
    if let Some((username, password)) = auth {
        request = request.basic_auth(username, Some(password));
    }
    if let Some(body) = body {
        request = request.body(body.text);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let response_type = header_text(response.headers(), CONTENT_TYPE);
    let content_length =
        header_text(response.headers(), CONTENT_LENGTH).and_then(|l| l.parse::<u64>().ok());
    let bytes = if is_head {
        Vec::new()
    } else {
        response.bytes().await?.to_vec()
    };

    classify(
        RawResponse {
            is_head,
            status,
            content_type: response_type.as_deref(),
            content_length,
            body: &bytes,
        },
        raw,
    )
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
