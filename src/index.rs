use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{DatasetRecord, FACET_ORDER, FileInfo, drs_relative_path};
use crate::error::EsgfError;

pub const DEFAULT_SEARCH_LIMIT: usize = 1000;
pub const FILE_LISTING_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub facets: Vec<(String, String)>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facet(mut self, name: &str, value: &str) -> Self {
        self.facets.push((name.to_string(), value.to_string()));
        self
    }

    pub fn facet_values(mut self, name: &str, values: &[&str]) -> Self {
        for value in values {
            self.facets.push((name.to_string(), (*value).to_string()));
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_or_default(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }

    pub fn grouped_facets(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, value) in &self.facets {
            grouped.entry(name.as_str()).or_default().push(value.as_str());
        }
        grouped
    }
}

pub trait SearchIndex: Send + Sync {
    fn name(&self) -> &str;
    fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetRecord>, EsgfError>;
    fn file_listing(&self, subject: &str) -> Result<Vec<FileInfo>, EsgfError>;
}

pub fn record_from_doc(doc: &Value, index_name: &str) -> Option<DatasetRecord> {
    let id = string_field(doc, "id")?;
    let version = string_field(doc, "version").unwrap_or_default();
    let data_node = string_field(doc, "data_node")
        .or_else(|| id.split('|').nth(1).map(str::to_string))
        .unwrap_or_default();
    let mut facets = BTreeMap::new();
    for name in FACET_ORDER {
        if let Some(value) = string_field(doc, name) {
            facets.insert((*name).to_string(), value);
        }
    }
    Some(DatasetRecord {
        subject: id.clone(),
        id,
        version,
        data_node,
        index_name: index_name.to_string(),
        facets,
    })
}

pub fn file_from_doc(doc: &Value) -> Option<FileInfo> {
    let filename = string_field(doc, "title")?;
    let dataset_id = string_field(doc, "dataset_id")?;
    let relative_path = drs_relative_path(&dataset_id, &filename);
    let urls = http_urls(doc);
    let size = doc.get("size").and_then(Value::as_u64);
    Some(FileInfo {
        filename,
        relative_path,
        urls,
        size,
    })
}

pub fn string_field(doc: &Value, name: &str) -> Option<String> {
    match doc.get(name)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Array(values) => values.first().and_then(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

fn http_urls(doc: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(entries) = doc.get("url").and_then(Value::as_array) {
        for entry in entries {
            if let Some(text) = entry.as_str() {
                let mut parts = text.split('|');
                let address = parts.next().unwrap_or_default();
                let service = parts.nth(1).unwrap_or_default();
                if service == "HTTPServer" && !address.is_empty() {
                    urls.push(address.to_string());
                }
            }
        }
    }
    urls
}
