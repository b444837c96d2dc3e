use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::EsgfError;

pub const UNAVAILABLE_MESSAGE: &str = "Could not obtain this file.";

pub trait DatasetOpener {
    type Dataset;

    fn open(&self, path: &Utf8Path) -> Result<Self::Dataset, EsgfError>;
    fn open_multi(&self, paths: &[Utf8PathBuf]) -> Result<Self::Dataset, EsgfError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized<D> {
    Dataset(D),
    Unavailable,
}

impl<D> Materialized<D> {
    pub fn dataset(&self) -> Option<&D> {
        match self {
            Materialized::Dataset(dataset) => Some(dataset),
            Materialized::Unavailable => None,
        }
    }

    pub fn into_dataset(self) -> Option<D> {
        match self {
            Materialized::Dataset(dataset) => Some(dataset),
            Materialized::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Materialized::Unavailable)
    }
}

#[derive(Debug)]
pub struct DatasetTree<D> {
    pub children: BTreeMap<String, DatasetTree<D>>,
    pub dataset: Option<Materialized<D>>,
}

impl<D> Default for DatasetTree<D> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
            dataset: None,
        }
    }
}

impl<D> DatasetTree<D> {
    pub fn from_dict(datasets: BTreeMap<String, Materialized<D>>) -> Self {
        let mut root = Self::default();
        for (key, dataset) in datasets {
            let mut node = &mut root;
            for segment in key.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.dataset = Some(dataset);
        }
        root
    }

    pub fn get(&self, path: &str) -> Option<&DatasetTree<D>> {
        let mut node = self;
        for segment in path.split('/') {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    pub fn len(&self) -> usize {
        let mut count = usize::from(self.dataset.is_some());
        for child in self.children.values() {
            count += child.len();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
