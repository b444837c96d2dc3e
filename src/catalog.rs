use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::combine::combine_results;
use crate::config::CatalogConfig;
use crate::dataset::{DatasetOpener, DatasetTree, Materialized};
use crate::domain::{DatasetRecord, RecordSet};
use crate::error::EsgfError;
use crate::globus::{DEFAULT_GLOBUS_INDEX, GlobusEsgfIndex};
use crate::index::{SearchIndex, SearchQuery};
use crate::keys::{format_key, key_columns};
use crate::resolve::FileResolver;
use crate::select::{ModelGroup, model_group_counts, reduce_ensembles, remove_incomplete_groups};
use crate::solr::{LLNL_NODE, ORNL_NODE, SolrEsgfIndex};
use crate::transfer::{Downloader, HttpsDownloader};

#[derive(Debug, Clone)]
pub struct DatasetDictOptions {
    pub minimal_keys: bool,
    pub ignore_facets: Vec<String>,
    pub separator: String,
}

impl Default for DatasetDictOptions {
    fn default() -> Self {
        Self {
            minimal_keys: true,
            ignore_facets: Vec::new(),
            separator: ".".to_string(),
        }
    }
}

pub struct Catalog<T: Downloader> {
    indices: Vec<Box<dyn SearchIndex>>,
    downloader: T,
    config: CatalogConfig,
    records: Option<RecordSet>,
}

impl Catalog<HttpsDownloader> {
    pub fn new() -> Result<Self, EsgfError> {
        let config = CatalogConfig::new()?;
        config.initialize()?;
        let indices: Vec<Box<dyn SearchIndex>> = vec![
            Box::new(SolrEsgfIndex::new(LLNL_NODE, true)?),
            Box::new(SolrEsgfIndex::new(ORNL_NODE, false)?),
            Box::new(GlobusEsgfIndex::new(DEFAULT_GLOBUS_INDEX)?),
        ];
        Ok(Self::with_parts(indices, HttpsDownloader::new()?, config))
    }
}

impl<T: Downloader> Catalog<T> {
    pub fn with_parts(
        indices: Vec<Box<dyn SearchIndex>>,
        downloader: T,
        config: CatalogConfig,
    ) -> Self {
        Self {
            indices,
            downloader,
            config,
            records: None,
        }
    }

    pub fn records(&self) -> Option<&RecordSet> {
        self.records.as_ref()
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn search(&mut self, query: &SearchQuery) -> &mut Self {
        let mut results = Vec::with_capacity(self.indices.len());
        for index in &self.indices {
            let start = Instant::now();
            let records = match index.search(query) {
                Ok(records) => records,
                Err(err) => {
                    warn!("search on {} failed: {err}", index.name());
                    Vec::new()
                }
            };
            info!(
                "{} returned {} records in {:.2}s",
                index.name(),
                records.len(),
                start.elapsed().as_secs_f64()
            );
            results.push(records);
        }
        self.records = Some(combine_results(results));
        self
    }

    pub fn set_esgf_data_root(&mut self, root: Utf8PathBuf) -> Result<&mut Self, EsgfError> {
        self.config.set_esgf_data_root(root)?;
        Ok(self)
    }

    pub fn unique(&self) -> Vec<(String, Vec<String>)> {
        match &self.records {
            Some(set) => set
                .columns()
                .iter()
                .map(|column| (column.clone(), set.distinct_values(column)))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn model_groups(&self) -> BTreeMap<ModelGroup, usize> {
        match &self.records {
            Some(set) => model_group_counts(set),
            None => BTreeMap::new(),
        }
    }

    pub fn remove_incomplete<F>(&mut self, complete: F) -> &mut Self
    where
        F: Fn(&[&DatasetRecord]) -> bool,
    {
        if let Some(set) = self.records.as_mut() {
            let before = set.len();
            remove_incomplete_groups(set, complete);
            info!("remove_incomplete dropped {} records", before - set.len());
        }
        self
    }

    pub fn remove_ensembles(&mut self) -> Result<&mut Self, EsgfError> {
        if let Some(set) = self.records.as_mut() {
            let before = set.len();
            reduce_ensembles(set)?;
            info!("remove_ensembles dropped {} records", before - set.len());
        }
        Ok(self)
    }

    pub fn to_dataset_dict<O>(
        &self,
        opener: &O,
        options: &DatasetDictOptions,
    ) -> Result<BTreeMap<String, Materialized<O::Dataset>>, EsgfError>
    where
        O: DatasetOpener,
    {
        let set = match &self.records {
            Some(set) if !set.is_empty() => set,
            _ => return Err(EsgfError::EmptyCatalog),
        };
        let columns = key_columns(set, options.minimal_keys, &options.ignore_facets);
        let resolver = FileResolver::new(
            self.config.esgf_data_root(),
            self.config.local_cache(),
            &self.downloader,
        );
        let mut datasets = BTreeMap::new();
        for record in set.records() {
            let files = match self.index_named(&record.index_name) {
                Ok(index) => resolver.resolve(record, index),
                Err(err) => {
                    warn!("{err}");
                    Vec::new()
                }
            };
            let key = format_key(record, &columns, &options.separator);
            let value = match files.len() {
                0 => Materialized::Unavailable,
                1 => Materialized::Dataset(opener.open(&files[0])?),
                _ => Materialized::Dataset(opener.open_multi(&files)?),
            };
            datasets.insert(key, value);
        }
        Ok(datasets)
    }

    pub fn to_datatree<O>(
        &self,
        opener: &O,
        options: &DatasetDictOptions,
    ) -> Result<DatasetTree<O::Dataset>, EsgfError>
    where
        O: DatasetOpener,
    {
        let options = DatasetDictOptions {
            separator: "/".to_string(),
            ..options.clone()
        };
        Ok(DatasetTree::from_dict(
            self.to_dataset_dict(opener, &options)?,
        ))
    }

    fn index_named(&self, name: &str) -> Result<&dyn SearchIndex, EsgfError> {
        self.indices
            .iter()
            .map(|index| index.as_ref())
            .find(|index| index.name() == name)
            .ok_or_else(|| EsgfError::UnknownIndex(name.to_string()))
    }
}

impl<T: Downloader> fmt::Display for Catalog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = match &self.records {
            Some(set) => set,
            None => return write!(f, "Perform a search() to populate the catalog."),
        };
        if set.is_empty() {
            return write!(f, "Search returned no results.");
        }
        for (column, values) in self.unique() {
            writeln!(f, "{column}: {}", values.join(", "))?;
        }
        Ok(())
    }
}
