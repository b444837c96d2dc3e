use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::EsgfError;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    local_cache: Utf8PathBuf,
    log_path: Utf8PathBuf,
    esgf_data_root: Option<Utf8PathBuf>,
}

impl CatalogConfig {
    pub fn new() -> Result<Self, EsgfError> {
        let cache = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".esgf")).ok())
            .ok_or_else(|| {
                EsgfError::Filesystem("unable to resolve home directory".to_string())
            })?;
        Ok(Self::with_local_cache(cache))
    }

    pub fn with_local_cache(local_cache: Utf8PathBuf) -> Self {
        let log_path = local_cache.join("esgf.log");
        Self {
            local_cache,
            log_path,
            esgf_data_root: None,
        }
    }

    pub fn local_cache(&self) -> &Utf8Path {
        &self.local_cache
    }

    pub fn log_path(&self) -> &Utf8Path {
        &self.log_path
    }

    pub fn esgf_data_root(&self) -> Option<&Utf8Path> {
        self.esgf_data_root.as_deref()
    }

    pub fn set_esgf_data_root(&mut self, root: Utf8PathBuf) -> Result<(), EsgfError> {
        if !root.as_std_path().is_dir() {
            return Err(EsgfError::InvalidDataRoot(root.into_std_path_buf()));
        }
        self.esgf_data_root = Some(root);
        Ok(())
    }

    pub fn initialize(&self) -> Result<(), EsgfError> {
        fs::create_dir_all(self.local_cache.as_std_path())
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path.as_std_path())
            .map_err(|err| EsgfError::Filesystem(err.to_string()))?;
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
        info!(
            "catalog session started {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(())
    }
}
