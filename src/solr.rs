use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{DatasetRecord, FileInfo};
use crate::error::EsgfError;
use crate::index::{
    FILE_LISTING_LIMIT, SearchIndex, SearchQuery, file_from_doc, record_from_doc,
};

pub const LLNL_NODE: &str = "esgf-node.llnl.gov";
pub const ORNL_NODE: &str = "esgf-node.ornl.gov";

#[derive(Clone)]
pub struct SolrEsgfIndex {
    client: Client,
    base_url: String,
    name: String,
    distrib: bool,
}

impl SolrEsgfIndex {
    pub fn new(node: &str, distrib: bool) -> Result<Self, EsgfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EsgfError::SolrHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| EsgfError::SolrHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("https://{node}/esg-search/search"),
            name: node.to_string(),
            distrib,
        })
    }

    fn query_docs(&self, params: Vec<(String, String)>) -> Result<Vec<Value>, EsgfError> {
        let response = self.send_with_retries(|| {
            let mut request = self.client.get(&self.base_url);
            for (name, value) in &params {
                request = request.query(&[(name.as_str(), value.as_str())]);
            }
            request
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Solr request failed".to_string());
            return Err(EsgfError::SolrStatus { status, message });
        }
        let payload = response
            .json::<Value>()
            .map_err(|err| EsgfError::SolrHttp(err.to_string()))?;
        let docs = payload
            .get("response")
            .and_then(|body| body.get("docs"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(docs)
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
                    return Err(EsgfError::SolrHttp(err.to_string()));
                }
            }
        }
    }
}

impl SearchIndex for SolrEsgfIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetRecord>, EsgfError> {
        let mut params = vec![
            ("type".to_string(), "Dataset".to_string()),
            ("format".to_string(), "application/solr+json".to_string()),
            ("distrib".to_string(), self.distrib.to_string()),
            ("limit".to_string(), query.limit_or_default().to_string()),
        ];
        for (name, value) in &query.facets {
            params.push((name.clone(), value.clone()));
        }
        let docs = self.query_docs(params)?;
        Ok(docs
            .iter()
            .filter_map(|doc| record_from_doc(doc, &self.name))
            .collect())
    }

    fn file_listing(&self, subject: &str) -> Result<Vec<FileInfo>, EsgfError> {
        let params = vec![
            ("type".to_string(), "File".to_string()),
            ("format".to_string(), "application/solr+json".to_string()),
            ("distrib".to_string(), self.distrib.to_string()),
            ("limit".to_string(), FILE_LISTING_LIMIT.to_string()),
            ("dataset_id".to_string(), subject.to_string()),
        ];
        let docs = self.query_docs(params)?;
        Ok(docs.iter().filter_map(file_from_doc).collect())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
