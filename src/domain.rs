use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EsgfError;

pub const FACET_ORDER: &[&str] = &[
    "project",
    "mip_era",
    "activity_drs",
    "activity_id",
    "product",
    "institute",
    "institution_id",
    "model",
    "source_id",
    "experiment_id",
    "sub_experiment_id",
    "ensemble",
    "member_id",
    "variant_label",
    "cmor_table",
    "table_id",
    "variable_id",
    "grid_label",
    "time_frequency",
    "frequency",
    "realm",
    "nominal_resolution",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId {
    pub realization: u32,
    pub initialization: u32,
    pub physics: u32,
    pub forcing: u32,
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}i{}p{}f{}",
            self.realization, self.initialization, self.physics, self.forcing
        )
    }
}

impl FromStr for MemberId {
    type Err = EsgfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(r"^r(\d+)i(\d+)p(\d+)f(\d+)$").unwrap();
        let captures = pattern
            .captures(value.trim())
            .ok_or_else(|| EsgfError::InvalidMemberId(value.to_string()))?;
        let number = |index: usize| {
            captures[index]
                .parse::<u32>()
                .map_err(|_| EsgfError::InvalidMemberId(value.to_string()))
        };
        Ok(Self {
            realization: number(1)?,
            initialization: number(2)?,
            physics: number(3)?,
            forcing: number(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub version: String,
    pub data_node: String,
    pub subject: String,
    pub index_name: String,
    #[serde(default)]
    pub facets: BTreeMap<String, String>,
}

impl DatasetRecord {
    pub fn facet(&self, name: &str) -> Option<&str> {
        self.facets.get(name).map(String::as_str)
    }

    pub fn master_id(&self) -> &str {
        self.id.split('|').next().unwrap_or(&self.id)
    }

    pub fn member_id(&self) -> Result<MemberId, EsgfError> {
        let value = self.facet("member_id").ok_or_else(|| EsgfError::MissingFacet {
            id: self.id.clone(),
            facet: "member_id".to_string(),
        })?;
        value.parse()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    columns: Vec<String>,
    records: Vec<DatasetRecord>,
}

impl RecordSet {
    pub fn from_records(records: Vec<DatasetRecord>) -> Self {
        let mut names = BTreeSet::new();
        for record in &records {
            for name in record.facets.keys() {
                names.insert(name.clone());
            }
        }
        let mut columns = names.into_iter().collect::<Vec<_>>();
        columns.sort_by_key(|name| {
            let rank = FACET_ORDER
                .iter()
                .position(|facet| *facet == name.as_str())
                .unwrap_or(FACET_ORDER.len());
            (rank, name.clone())
        });
        Self { columns, records }
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        for record in &self.records {
            if let Some(value) = record.facet(column) {
                seen.insert(value.to_string());
            }
        }
        seen.into_iter().collect()
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&DatasetRecord) -> bool,
    {
        self.records.retain(keep);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: String,
    pub relative_path: Utf8PathBuf,
    pub urls: Vec<String>,
    pub size: Option<u64>,
}

pub fn drs_relative_path(dataset_id: &str, filename: &str) -> Utf8PathBuf {
    let master = dataset_id.split('|').next().unwrap_or(dataset_id);
    let mut path = Utf8PathBuf::new();
    for segment in master.split('.') {
        path.push(segment);
    }
    path.push(filename);
    path
}
