//! 🔎 esq: an Elasticsearch client that speaks in conditions, not in JSON soup.
//!
//! 🧠 Knowledge graph:
//! - [`condition`]: the AST (`["and", {...}, ["in", "color", [...]]]` and friends)
//! - [`compiler`]: AST + [`Query`] → search DSL, version-aware
//! - [`query`]: the fluent builder and its terminal operations
//! - [`command`] / [`endpoints`]: one method per REST endpoint, paths gated on DSL version
//! - [`bulk`]: NDJSON `_bulk` batches
//! - [`connection`]: nodes, discovery, selection and the single request boundary
//! - [`profiler`]: request timing hooks
//! - [`app_config`]: figment-powered configuration
//!
//! ```no_run
//! # async fn demo() -> esq::Result<()> {
//! use esq::{Condition, Connection, DslVersion, Node, Query, SortDirection};
//!
//! let mut conn = Connection::new(vec![Node::new("localhost:9200")])
//!     .with_autodetect(false)
//!     .with_dsl_version(DslVersion(7));
//! let rows = Query::new()
//!     .from("products", None)
//!     .where_(Condition::eq("status", "active"))
//!     .and_where(Condition::in_list("color", ["red", "blue"]))
//!     .order_by("price", SortDirection::Desc)
//!     .limit(10)
//!     .all(&mut conn)
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod app_config;
pub mod bulk;
pub mod command;
pub mod common;
pub mod compiler;
pub mod condition;
pub mod connection;
pub mod endpoints;
pub mod error;
pub mod profiler;
pub mod query;
pub mod result;

pub use bulk::BulkCommand;
pub use command::Command;
pub use common::{DslVersion, Options, PathSegment};
pub use compiler::{CompiledQuery, QueryBuilder, compile};
pub use condition::{Condition, Operand, RangeOp};
pub use connection::{Body, Connection, Credentials, Node, NodeSelector, Protocol, Reply};
pub use error::{Error, Result};
pub use profiler::{Profiler, RequestObserver, SharedProfiler, Timer};
pub use query::{IndexBy, Query, Rows, SortDirection};
pub use result::ElasticResult;
