use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};

use crate::domain::{DatasetRecord, FileInfo};
use crate::error::EsgfError;
use crate::index::{
    FILE_LISTING_LIMIT, SearchIndex, SearchQuery, file_from_doc, record_from_doc,
};

pub const DEFAULT_GLOBUS_INDEX: &str = "d927e2d9-ccdb-48e4-b05d-adbb3d97bbef";

#[derive(Clone)]
pub struct GlobusEsgfIndex {
    client: Client,
    search_url: String,
    name: String,
}

impl GlobusEsgfIndex {
    pub fn new(index_id: &str) -> Result<Self, EsgfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EsgfError::GlobusHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| EsgfError::GlobusHttp(err.to_string()))?;
        let short = index_id.get(..8).unwrap_or(index_id);
        Ok(Self {
            client,
            search_url: format!("https://search.api.globus.org/v1/index/{index_id}/search"),
            name: format!("globus-{short}"),
        })
    }

    fn post_search(&self, body: &Value) -> Result<Value, EsgfError> {
        let response = self.send_with_retries(|| self.client.post(&self.search_url).json(body))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Globus search failed".to_string());
            return Err(EsgfError::GlobusStatus { status, message });
        }
        response
            .json::<Value>()
            .map_err(|err| EsgfError::GlobusHttp(err.to_string()))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, EsgfError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(EsgfError::GlobusHttp(err.to_string()));
                }
            }
        }
    }
}

impl SearchIndex for GlobusEsgfIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetRecord>, EsgfError> {
        let mut filters = vec![json!({
            "type": "match_any",
            "field_name": "type",
            "values": ["Dataset"],
        })];
        for (name, values) in query.grouped_facets() {
            filters.push(json!({
                "type": "match_any",
                "field_name": name,
                "values": values,
            }));
        }
        let body = json!({
            "q": "",
            "filters": filters,
            "facets": [],
            "sort": [],
            "limit": query.limit_or_default(),
        });
        let payload = self.post_search(&body)?;
        Ok(records_from_response(&payload, &self.name))
    }

    fn file_listing(&self, subject: &str) -> Result<Vec<FileInfo>, EsgfError> {
        let body = json!({
            "q": "",
            "filters": [{
                "type": "match_any",
                "field_name": "dataset_id",
                "values": [subject],
            }],
            "facets": [],
            "sort": [],
            "limit": FILE_LISTING_LIMIT,
        });
        let payload = self.post_search(&body)?;
        Ok(files_from_response(&payload))
    }
}

pub fn records_from_response(payload: &Value, index_name: &str) -> Vec<DatasetRecord> {
    let mut records = Vec::new();
    if let Some(gmeta) = payload.get("gmeta").and_then(Value::as_array) {
        for meta in gmeta {
            let subject = meta.get("subject").and_then(Value::as_str);
            if let Some(entries) = meta.get("entries").and_then(Value::as_array) {
                for entry in entries {
                    if let Some(content) = entry.get("content") {
                        if let Some(mut record) = record_from_doc(content, index_name) {
                            if let Some(subject) = subject {
                                record.subject = subject.to_string();
                            }
                            records.push(record);
                        }
                    }
                }
            }
        }
    }
    records
}

pub fn files_from_response(payload: &Value) -> Vec<FileInfo> {
    let mut files = Vec::new();
    if let Some(gmeta) = payload.get("gmeta").and_then(Value::as_array) {
        for meta in gmeta {
            if let Some(entries) = meta.get("entries").and_then(Value::as_array) {
                for entry in entries {
                    if let Some(file) = entry.get("content").and_then(file_from_doc) {
                        files.push(file);
                    }
                }
            }
        }
    }
    files
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
