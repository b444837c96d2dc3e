use std::fs;
use std::io;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::EsgfError;

pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), EsgfError>;
}

#[derive(Clone)]
pub struct HttpsDownloader {
    client: Client,
}

impl HttpsDownloader {
    pub fn new() -> Result<Self, EsgfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EsgfError::DownloadHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| EsgfError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
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
                    return Err(EsgfError::DownloadHttp(err.to_string()));
                }
            }
        }
    }
}

impl Downloader for HttpsDownloader {
    fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), EsgfError> {
        let mut response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(EsgfError::DownloadStatus { status, message });
        }
        let parent = destination
            .parent()
            .ok_or_else(|| EsgfError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".esgf-download")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        io::copy(&mut response, &mut temp)
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
