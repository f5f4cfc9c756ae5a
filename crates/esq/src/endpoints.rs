//! 🗺️ Endpoint paths: every URL shape the commands speak, version gating included.
//!
//! Pure functions, no I/O. Before 7 documents live under `index/type`; from 7 on they live
//! under `index/_doc`, mappings hang off the index alone, and search forgets types entirely.

use crate::common::{DslVersion, PathSegment};
use crate::error::{Error, Result};
use crate::path;

/// `{index|_all}[/type]/_search`; the type only counts before 7.
pub fn search(version: DslVersion, index: Option<&str>, doc_type: Option<&str>) -> Vec<PathSegment> {
    let mut segments = path![index.unwrap_or("_all")];
    if let Some(doc_type) = doc_type.filter(|t| !version.is_typeless() && !t.is_empty()) {
        segments.push(doc_type.into());
    }
    segments.push("_search".into());
    segments
}

pub fn delete_by_query(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_delete_by_query"]
}

/// Suggesters ride on a plain search request.
pub fn suggest(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_search"]
}

/// `index/{type|_doc}[/id]`: with an id it is a document, without one a collection.
pub fn document(version: DslVersion, index: &str, doc_type: &str, id: Option<&str>) -> Vec<PathSegment> {
    let mut segments = path![index, version.doc_segment(doc_type)];
    if let Some(id) = id {
        segments.push(id.into());
    }
    segments
}

pub fn mget(version: DslVersion, index: &str, doc_type: &str) -> Vec<PathSegment> {
    path![index, version.doc_segment(doc_type), "_mget"]
}

pub fn update(version: DslVersion, index: &str, doc_type: &str, id: &str) -> Vec<PathSegment> {
    path![index, version.doc_segment(doc_type), id, "_update"]
}

pub fn index(index: &str) -> Vec<PathSegment> {
    path![index]
}

/// Type existence: the index alone from 7 on.
pub fn type_exists(version: DslVersion, index: &str, doc_type: &str) -> Vec<PathSegment> {
    if version.is_typeless() {
        path![index]
    } else {
        path![index, doc_type]
    }
}

pub fn all_aliases() -> Vec<PathSegment> {
    path!["_alias", "*"]
}

pub fn alias(alias: &str) -> Vec<PathSegment> {
    path!["_alias", alias]
}

pub fn index_aliases(index: &str) -> Vec<PathSegment> {
    path![index, "_alias", "*"]
}

pub fn index_alias(index: &str, alias: &str) -> Vec<PathSegment> {
    path![index, "_alias", alias]
}

pub fn alias_actions() -> Vec<PathSegment> {
    path!["_aliases"]
}

pub fn settings(index: &str) -> Vec<PathSegment> {
    path![index, "_settings"]
}

pub fn open_index(index: &str) -> Vec<PathSegment> {
    path![index, "_open"]
}

pub fn close_index(index: &str) -> Vec<PathSegment> {
    path![index, "_close"]
}

pub fn scroll() -> Vec<PathSegment> {
    path!["_search", "scroll"]
}

pub fn stats(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_stats"]
}

pub fn recovery(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_recovery"]
}

pub fn clear_cache(index: &str) -> Vec<PathSegment> {
    path![index, "_cache", "clear"]
}

pub fn flush(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_flush"]
}

pub fn refresh(index: Option<&str>) -> Vec<PathSegment> {
    path![index.unwrap_or("_all"), "_refresh"]
}

/// Put-mapping: `index/_mapping` from 7, `index/_mapping/type` before.
pub fn set_mapping(version: DslVersion, index: &str, doc_type: &str) -> Vec<PathSegment> {
    if version.is_typeless() {
        path![index, "_mapping"]
    } else {
        path![index, "_mapping", doc_type]
    }
}

pub fn get_mapping(version: DslVersion, index: Option<&str>, doc_type: Option<&str>) -> Vec<PathSegment> {
    let mut segments = path![index.unwrap_or("_all"), "_mapping"];
    if let Some(doc_type) = doc_type.filter(|t| !version.is_typeless() && !t.is_empty()) {
        segments.push(doc_type.into());
    }
    segments
}

pub fn template(name: &str) -> Vec<PathSegment> {
    path!["_template", name]
}

/// 📦 `[index[/type]]/_bulk`. A type with no index to hang it on is a configuration mistake.
pub fn bulk(version: DslVersion, index: Option<&str>, doc_type: Option<&str>) -> Result<Vec<PathSegment>> {
    match (index, doc_type) {
        (None, None) => Ok(path!["_bulk"]),
        (Some(index), None) => Ok(path![index, "_bulk"]),
        (Some(index), Some(_)) if version.is_typeless() => Ok(path![index, "_bulk"]),
        (Some(index), Some(doc_type)) => Ok(path![index, doc_type, "_bulk"]),
        (None, Some(doc_type)) => Err(Error::configuration(format!(
            "Bulk type '{doc_type}' is bound without an index."
        ))),
    }
}
