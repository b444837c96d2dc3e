use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::domain::{DatasetRecord, FileInfo};
use crate::error::EsgfError;
use crate::index::SearchIndex;
use crate::transfer::Downloader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    EsgfDataRoot,
    LocalCache,
    Thredds,
    GlobusTransfer,
    HttpsDownload,
}

pub const STRATEGY_CHAIN: &[Strategy] = &[
    Strategy::EsgfDataRoot,
    Strategy::LocalCache,
    Strategy::Thredds,
    Strategy::GlobusTransfer,
    Strategy::HttpsDownload,
];

pub struct FileResolver<'a, T: Downloader> {
    esgf_data_root: Option<&'a Utf8Path>,
    local_cache: &'a Utf8Path,
    downloader: &'a T,
}

impl<'a, T: Downloader> FileResolver<'a, T> {
    pub fn new(
        esgf_data_root: Option<&'a Utf8Path>,
        local_cache: &'a Utf8Path,
        downloader: &'a T,
    ) -> Self {
        Self {
            esgf_data_root,
            local_cache,
            downloader,
        }
    }

    pub fn resolve(&self, record: &DatasetRecord, index: &dyn SearchIndex) -> Vec<Utf8PathBuf> {
        let listing = match index.file_listing(&record.subject) {
            Ok(listing) => listing,
            Err(err) => {
                warn!("file listing for {} failed: {err}", record.id);
                return Vec::new();
            }
        };
        if listing.is_empty() {
            warn!("no file entries for {}", record.id);
            return Vec::new();
        }
        for strategy in STRATEGY_CHAIN {
            let found = match self.attempt(*strategy, &listing) {
                Ok(found) => found,
                Err(err) => {
                    warn!("{strategy:?} failed for {}: {err}", record.id);
                    Vec::new()
                }
            };
            if !found.is_empty() {
                debug!("{strategy:?} resolved {} files for {}", found.len(), record.id);
                return found;
            }
        }
        Vec::new()
    }

    fn attempt(
        &self,
        strategy: Strategy,
        listing: &[FileInfo],
    ) -> Result<Vec<Utf8PathBuf>, EsgfError> {
        match strategy {
            Strategy::EsgfDataRoot => match self.esgf_data_root {
                Some(root) => Ok(match_under_root(root, listing)),
                None => Ok(Vec::new()),
            },
            Strategy::LocalCache => Ok(match_under_root(self.local_cache, listing)),
            Strategy::Thredds | Strategy::GlobusTransfer => Ok(Vec::new()),
            Strategy::HttpsDownload => self.download_all(listing),
        }
    }

    fn download_all(&self, listing: &[FileInfo]) -> Result<Vec<Utf8PathBuf>, EsgfError> {
        let mut paths = Vec::new();
        for file in listing {
            let destination = self.local_cache.join(&file.relative_path);
            if destination.as_std_path().is_file() {
                paths.push(destination);
                continue;
            }
            let mut obtained = false;
            for url in &file.urls {
                match self.downloader.download(url, &destination) {
                    Ok(()) => {
                        obtained = true;
                        break;
                    }
                    Err(err) => warn!("download of {url} failed: {err}"),
                }
            }
            if obtained {
                paths.push(destination);
            } else {
                warn!("every url for {} failed", file.filename);
            }
        }
        Ok(paths)
    }
}

fn match_under_root(root: &Utf8Path, listing: &[FileInfo]) -> Vec<Utf8PathBuf> {
    let mut paths = Vec::new();
    for file in listing {
        let path = root.join(&file.relative_path);
        if !path.as_std_path().is_file() {
            return Vec::new();
        }
        paths.push(path);
    }
    paths
}
