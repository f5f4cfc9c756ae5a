//! 🚀 esq-cli: poke a cluster from the terminal.
//!
//! 📦 Thin on purpose: parse args, load config, set up logging, call into `esq`, print.
//! The library does the thinking; this crate does the talking. 🦆

mod ndjson;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use esq::{Condition, Connection, Options, Query, SortDirection};

#[derive(Debug, Parser)]
#[command(name = "esq", version, about = "🔎 Query Elasticsearch with conditions instead of JSON soup")]
struct Cli {
    /// TOML config file. Skipped when it does not exist; `ESQ_*` env vars still apply.
    #[arg(short, long, env = "ESQ_CONFIG", default_value = "esq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 🔍 Search and print the hits as a table.
    Search {
        #[arg(long)]
        index: String,
        #[arg(long = "type")]
        doc_type: Option<String>,
        /// Condition as JSON: `{"status":"active"}` or `["in","color",["red"]]`.
        #[arg(long = "where")]
        where_: Option<String>,
        /// Raw query DSL, AND'ed with --where.
        #[arg(long)]
        query: Option<String>,
        /// `field:asc` or `field:desc`; repeatable.
        #[arg(long)]
        sort: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// 🧮 Count matching documents.
    Count {
        #[arg(long)]
        index: String,
        #[arg(long = "where")]
        where_: Option<String>,
    },
    /// 📄 Fetch one document by id.
    Get {
        #[arg(long)]
        index: String,
        #[arg(long = "type", default_value = "_doc")]
        doc_type: String,
        #[arg(long)]
        id: String,
    },
    /// 🗺️ Open the connection and list the nodes it will use.
    Nodes,
    /// 📦 Index an NDJSON file (optionally .gz) through _bulk.
    Bulk {
        #[arg(long)]
        index: String,
        #[arg(long)]
        file: PathBuf,
        /// Documents per bulk request.
        #[arg(long, default_value_t = 500)]
        batch: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the chain; if any layer smells like a dead socket, say so
        let mut looks_like_connection_trouble = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                looks_like_connection_trouble = true;
            }
        }
        if looks_like_connection_trouble {
            error!(
                "🔧 hint: Elasticsearch does not seem to be reachable. Check that it is running \
                 and that the configured nodes point at it (`docker ps` is a fine first step)."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.as_path();
    let config_file = config_file
        .try_exists()
        .with_context(|| format!("💀 Could not check for config file '{}'", config_file.display()))?
        .then_some(config_file);

    let app_config = esq::app_config::load_config(config_file)
        .context("💀 esq-cli could not load its configuration")?;
    let mut conn = app_config
        .connection
        .into_connection()
        .context("💀 The connection settings did not add up")?;

    match cli.command {
        Commands::Search {
            index,
            doc_type,
            where_,
            query,
            sort,
            limit,
            offset,
        } => {
            let mut search = Query::new().from(index, doc_type.as_deref());
            if let Some(condition) = parse_condition(where_.as_deref())? {
                search = search.where_(condition);
            }
            if let Some(raw) = query {
                search = search.query(serde_json::from_str(&raw).context("💀 --query is not valid JSON")?);
            }
            for spec in &sort {
                let (field, direction) = parse_sort(spec)?;
                search = search.add_order_by(field, direction);
            }
            if let Some(limit) = limit {
                search = search.limit(limit);
            }
            if let Some(offset) = offset {
                search = search.offset(offset);
            }
            let result = search.find(&mut conn).await?;
            println!("{}", hits_table(result.rows()));
            println!("total: {}", result.total());
        }
        Commands::Count { index, where_ } => {
            let mut count = Query::new().from(index, None);
            if let Some(condition) = parse_condition(where_.as_deref())? {
                count = count.where_(condition);
            }
            println!("{}", count.count(&mut conn).await?);
        }
        Commands::Get { index, doc_type, id } => {
            let mut command = conn.create_command().await?;
            match command.get(&index, &doc_type, &id, Options::new()).await? {
                Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
                None => {
                    warn!("🕳️ {index}/{id} not found");
                    std::process::exit(2);
                }
            }
        }
        Commands::Nodes => {
            conn.open().await?;
            println!("{}", nodes_table(&conn));
        }
        Commands::Bulk { index, file, batch } => {
            bulk_file(&mut conn, &index, &file, batch).await?;
        }
    }
    Ok(())
}

fn parse_condition(raw: Option<&str>) -> Result<Option<Condition>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("💀 --where is not valid JSON")?;
    Ok(Some(Condition::from_value(&value)?))
}

fn parse_sort(spec: &str) -> Result<(&str, SortDirection)> {
    match spec.rsplit_once(':') {
        None => Ok((spec, SortDirection::Asc)),
        Some((field, "asc")) => Ok((field, SortDirection::Asc)),
        Some((field, "desc")) => Ok((field, SortDirection::Desc)),
        Some((_, other)) => bail!("💀 Sort direction must be asc or desc, got '{other}'"),
    }
}

fn hits_table(rows: &[Value]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["_id", "_score", "_source"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.get("_id").and_then(Value::as_str).unwrap_or("")),
            Cell::new(row.get("_score").map_or_else(String::new, Value::to_string)),
            Cell::new(row.get("_source").map_or_else(String::new, Value::to_string)),
        ]);
    }
    table
}

fn nodes_table(conn: &Connection) -> Table {
    let active = conn.active_node().map(|n| n.base_url());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["", "node", "address"]);
    for node in conn.nodes() {
        let url = node.base_url();
        let marker = if active.as_deref() == Some(url.as_str()) { "*" } else { "" };
        table.add_row(vec![marker, url.as_str(), node.http_address.as_str()]);
    }
    table
}

/// 📦 Stream an NDJSON file into `_bulk`, one `index` action per line.
async fn bulk_file(conn: &mut Connection, index: &str, file: &Path, batch: usize) -> Result<()> {
    if batch == 0 {
        bail!("💀 --batch must be at least 1");
    }
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("💀 Could not read '{}'", file.display()))?;
    let bytes = ndjson::decode(file, raw)?;
    let documents = parse_documents(&ndjson::lines(&bytes)?, file)?;
    info!("📦 {} documents in '{}'", documents.len(), file.display());

    let progress = ProgressBar::new(bytes.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .context("💀 progress template")?
            .progress_chars("=>-"),
    );

    let mut indexed = 0usize;
    let mut failed = 0usize;
    for chunk in documents.chunks(batch) {
        let mut bulk = conn.create_bulk_command().await?.index(index);
        for (document, _) in chunk {
            bulk.add_action(json!({"index": {}}), Some(document.clone()));
        }
        let response = bulk.execute().await?.unwrap_or(Value::Null);
        let items = response.get("items").and_then(Value::as_array).map_or(0, Vec::len);
        let errors = response
            .get("items")
            .and_then(Value::as_array)
            .map_or(0, |items| items.iter().filter(|item| item_failed(item)).count());
        indexed += items - errors;
        failed += errors;

        // -- consumed bytes include blank lines and terminators, so the bar ends at 100%
        progress.inc(chunk.iter().map(|(_, consumed)| *consumed as u64).sum());
        progress.set_message(format!("indexed {indexed}, failed {failed}"));
    }
    progress.finish();

    if failed > 0 {
        warn!("⚠️ {failed} documents were rejected by the cluster");
    }
    println!("indexed: {indexed}, failed: {failed}");
    Ok(())
}

/// 🔍 Every line must be a JSON document; the whole file is checked before anything is sent.
fn parse_documents(lines: &[(&str, usize)], file: &Path) -> Result<Vec<(Value, usize)>> {
    lines
        .iter()
        .enumerate()
        .map(|(n, (line, consumed))| {
            serde_json::from_str::<Value>(line)
                .map(|document| (document, *consumed))
                .with_context(|| format!("💀 Document #{} in '{}' is not valid JSON", n + 1, file.display()))
        })
        .collect()
}

fn item_failed(item: &Value) -> bool {
    item.as_object()
        .and_then(|actions| actions.values().next())
        .is_some_and(|result| result.get("error").is_some())
}
