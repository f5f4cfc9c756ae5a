//! ⏱️ Request timing hooks: a stopwatch strapped to the transport.
//!
//! 🧠 Knowledge graph:
//! - [`RequestObserver`]: called immediately before and after every request the
//!   [`Connection`] executes. One call boundary per request, nothing else.
//! - [`Timer`]: a named, tagged stopwatch.
//! - [`Profiler`]: collects timers, merges default tags, and can flush them into an index.
//! - [`SharedProfiler`]: an `Arc<Mutex<Profiler>>` that can be installed as the observer and
//!   still be flushed through the same connection without deadlocking on itself. Its own
//!   flush requests are not timed, so a flush leaves nothing behind.
//!
//! ⚠️ Flushing is best effort. A lost timing document gets a `warn!` and nothing more;
//! it never turns into an error for the request that was being timed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::common::Options;
use crate::connection::{Body, Connection};
use crate::error::Result;
use crate::path;

/// 🧾 What is about to be (or just was) sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub body_bytes: usize,
}

/// How the request ended, minus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NotFound,
    Failed(String),
}

impl Outcome {
    pub fn as_str(&self) -> &str {
        match self {
            Outcome::Success => "success",
            Outcome::NotFound => "not_found",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// 🔔 Start/stop hooks around request execution.
pub trait RequestObserver: Send {
    fn request_started(&mut self, info: &RequestInfo);
    fn request_finished(&mut self, info: &RequestInfo, elapsed: Duration, outcome: &Outcome);
}

/// ⏱️ A named stopwatch with tags.
#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    tags: BTreeMap<String, Value>,
    started: Instant,
    start_seconds: f64,
    start_millis: i64,
    elapsed: Option<Duration>,
}

impl Timer {
    pub fn new(name: impl Into<String>, tags: BTreeMap<String, Value>) -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            name: name.into(),
            tags,
            started: Instant::now(),
            start_seconds: since_epoch.as_secs_f64(),
            start_millis: since_epoch.as_millis() as i64,
            elapsed: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> f64 {
        self.start_seconds
    }

    pub fn start_millis(&self) -> i64 {
        self.start_millis
    }

    pub fn tags(&self) -> &BTreeMap<String, Value> {
        &self.tags
    }

    pub fn is_stopped(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Stopping twice keeps the first reading.
    pub fn stop(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
    }

    /// Reading the time stops the clock.
    pub fn time(&mut self) -> Duration {
        self.stop();
        self.elapsed.unwrap_or_default()
    }

    /// 🏷️ First write wins; existing tags are never overwritten.
    pub fn add_tag(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.tags.entry(name.into()).or_insert_with(|| value.into());
    }

    fn to_document(&mut self) -> Value {
        json!({
            "timer": self.name,
            "start": self.start_seconds,
            "startMilliseconds": self.start_millis,
            "duration": self.time().as_secs_f64(),
            "tags": self.tags,
        })
    }
}

/// 📊 Timer collection with default tags.
#[derive(Debug, Default)]
pub struct Profiler {
    default_tags: BTreeMap<String, Value>,
    timers: Vec<Timer>,
}

impl Profiler {
    pub fn new(default_tags: BTreeMap<String, Value>) -> Self {
        Self {
            default_tags,
            timers: Vec::new(),
        }
    }

    /// 🚀 Start (or restart) the timer with this name. Caller tags win over defaults.
    pub fn start_timer(&mut self, name: &str, tags: BTreeMap<String, Value>) -> &mut Timer {
        let mut merged = self.default_tags.clone();
        merged.extend(tags);
        self.timers.retain(|t| t.name != name);
        self.timers.push(Timer::new(name, merged));
        let last = self.timers.len() - 1;
        &mut self.timers[last]
    }

    pub fn stop_timer(timer: &mut Timer) {
        timer.stop();
    }

    pub fn stop_timer_by_name(&mut self, name: &str) {
        if let Some(timer) = self.timers.iter_mut().find(|t| t.name == name) {
            timer.stop();
        }
    }

    pub fn timer(&self, name: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.name == name)
    }

    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    /// Hand over every collected timer and start fresh.
    pub fn drain(&mut self) -> Vec<Timer> {
        std::mem::take(&mut self.timers)
    }

    /// 🗑️ Index one document per timer, then forget them all.
    pub async fn flush(&mut self, connection: &mut Connection, index: &str) {
        let timers = self.drain();
        flush_timers(timers, connection, index).await;
    }
}

impl RequestObserver for Profiler {
    fn request_started(&mut self, info: &RequestInfo) {
        let mut tags = BTreeMap::new();
        tags.insert("method".to_string(), Value::String(info.method.clone()));
        tags.insert("url".to_string(), Value::String(info.url.clone()));
        tags.insert("body_bytes".to_string(), json!(info.body_bytes));
        self.start_timer(&timer_name(info), tags);
    }

    fn request_finished(&mut self, info: &RequestInfo, _elapsed: Duration, outcome: &Outcome) {
        let name = timer_name(info);
        if let Some(timer) = self.timers.iter_mut().find(|t| t.name == name) {
            timer.stop();
            timer.add_tag("outcome", outcome.as_str());
        }
    }
}

fn timer_name(info: &RequestInfo) -> String {
    format!("elasticsearch {} {}", info.method, info.url)
}

/// 🔒 A profiler that can be installed on a connection and flushed through it.
#[derive(Debug, Clone, Default)]
pub struct SharedProfiler {
    inner: Arc<Mutex<Profiler>>,
    flushing: Arc<AtomicBool>,
}

impl SharedProfiler {
    pub fn new(profiler: Profiler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(profiler)),
            flushing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Profiler> {
        // -- a poisoned stopwatch still tells time
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 🗑️ Drain under the lock, post outside it.
    ///
    /// While the timing documents go out, the observer hooks look the other way: the
    /// flush POSTs are not timed, so no fresh timers appear behind the drained ones.
    pub async fn flush(&self, connection: &mut Connection, index: &str) {
        let timers = self.lock().drain();
        self.flushing.store(true, Ordering::SeqCst);
        flush_timers(timers, connection, index).await;
        self.flushing.store(false, Ordering::SeqCst);
    }

    fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }
}

impl RequestObserver for SharedProfiler {
    fn request_started(&mut self, info: &RequestInfo) {
        if self.is_flushing() {
            return;
        }
        self.lock().request_started(info);
    }

    fn request_finished(&mut self, info: &RequestInfo, elapsed: Duration, outcome: &Outcome) {
        if self.is_flushing() {
            return;
        }
        self.lock().request_finished(info, elapsed, outcome);
    }
}

/// 🏗️ Create the timing index with a sane mapping if it is not there yet.
pub async fn prepare_timing_index(connection: &mut Connection, index: &str) -> Result<()> {
    let mut command = connection.create_command().await?;
    if !command.index_exists(index).await? {
        command
            .create_index(
                index,
                Some(json!({
                    "mappings": {
                        "properties": {
                            "startMilliseconds": {"type": "date", "format": "epoch_millis"},
                            "timer": {"type": "keyword"}
                        }
                    },
                    "settings": {"number_of_shards": 1, "number_of_replicas": 1}
                })),
            )
            .await?;
    }
    Ok(())
}

async fn flush_timers(timers: Vec<Timer>, connection: &mut Connection, index: &str) {
    let count = timers.len();
    for mut timer in timers {
        let document = timer.to_document();
        let posted = connection
            .request(
                Method::POST,
                &path![index, "_doc"],
                &Options::new(),
                Some(Body::json(document.to_string())),
                false,
            )
            .await;
        if let Err(err) = posted {
            warn!("⏱️ Dropped timing for '{}': {}", timer.name(), err);
        }
    }
    debug!("⏱️ Flushed {count} timers into '{index}'");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Node;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection_to(server: &MockServer) -> Connection {
        let address = server.uri().trim_start_matches("http://").to_string();
        Connection::new(vec![Node::new(address)])
            .with_autodetect(false)
            .with_dsl_version(7)
    }

    fn two_stopped_timers() -> Profiler {
        let mut profiler = Profiler::new(BTreeMap::new());
        profiler.start_timer("catalog", BTreeMap::new()).stop();
        profiler.start_timer("checkout", BTreeMap::new()).stop();
        profiler
    }

    #[test]
    fn the_one_where_stop_is_idempotent() {
        let mut timer = Timer::new("search", BTreeMap::new());
        timer.stop();
        let first = timer.time();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop();
        assert_eq!(timer.time(), first);
    }

    #[test]
    fn the_one_where_tags_are_first_come_first_served() {
        let mut timer = Timer::new("search", BTreeMap::new());
        timer.add_tag("index", "products");
        timer.add_tag("index", "orders");
        assert_eq!(timer.tags()["index"], "products");
    }

    #[test]
    fn the_one_where_defaults_merge_and_callers_win() {
        let mut defaults = BTreeMap::new();
        defaults.insert("app".to_string(), json!("shop"));
        defaults.insert("env".to_string(), json!("prod"));
        let mut profiler = Profiler::new(defaults);

        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), json!("staging"));
        profiler.start_timer("catalog", tags);
        profiler.stop_timer_by_name("catalog");

        let timer = profiler.timer("catalog").expect("timer was started");
        assert!(timer.is_stopped());
        assert_eq!(timer.tags()["app"], "shop");
        assert_eq!(timer.tags()["env"], "staging");
        assert_eq!(profiler.drain().len(), 1);
        assert!(profiler.timers().is_empty());
    }

    #[test]
    fn the_one_where_the_observer_times_each_request() {
        let mut profiler = SharedProfiler::default();
        let info = RequestInfo {
            method: "GET".into(),
            url: "http://localhost:9200/products/_search".into(),
            body_bytes: 2,
        };
        profiler.request_started(&info);
        profiler.request_finished(&info, Duration::from_millis(3), &Outcome::NotFound);

        let guard = profiler.lock();
        let timer = &guard.timers()[0];
        assert!(timer.is_stopped());
        assert_eq!(timer.tags()["outcome"], "not_found");
        assert_eq!(timer.tags()["method"], "GET");
    }

    #[tokio::test]
    async fn the_one_where_each_timer_becomes_a_document() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/timings/_doc"))
            .and(body_partial_json(json!({"tags": {}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "created"})))
            .expect(2)
            .mount(&server)
            .await;

        let mut profiler = two_stopped_timers();
        let mut conn = connection_to(&server);
        profiler.flush(&mut conn, "timings").await;

        assert!(profiler.timers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_grumpy_cluster_does_not_break_the_flush() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/timings/_doc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .expect(2)
            .mount(&server)
            .await;

        let mut profiler = two_stopped_timers();
        let mut conn = connection_to(&server);
        // -- no Result to check: a lost timing is a warning, not an error
        profiler.flush(&mut conn, "timings").await;

        assert!(profiler.timers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_shared_flush_does_not_time_itself() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "es-1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/timings/_doc"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "created"})))
            .expect(2)
            .mount(&server)
            .await;

        let profiler = SharedProfiler::default();
        let mut conn = connection_to(&server);
        conn.set_observer(profiler.clone());
        conn.node_info().await?;
        conn.node_info().await?;
        // -- same url twice means one restarted timer, so add a second by hand
        profiler.lock().start_timer("catalog", BTreeMap::new()).stop();
        assert_eq!(profiler.lock().timers().len(), 2);

        profiler.flush(&mut conn, "timings").await;
        assert!(profiler.lock().timers().is_empty());

        // -- the hooks are back on once the flush is done
        conn.node_info().await?;
        assert_eq!(profiler.lock().timers().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_timing_index_is_made_once() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/timings"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/timings"))
            .and(body_partial_json(json!({
                "mappings": {
                    "properties": {
                        "startMilliseconds": {"type": "date", "format": "epoch_millis"},
                        "timer": {"type": "keyword"}
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server);
        prepare_timing_index(&mut conn, "timings").await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_existing_timing_index_is_left_alone() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/timings"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server);
        prepare_timing_index(&mut conn, "timings").await?;
        Ok(())
    }
}
