use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use esgf_catalog::catalog::{Catalog, DatasetDictOptions};
use esgf_catalog::config::CatalogConfig;
use esgf_catalog::dataset::{DatasetOpener, Materialized};
use esgf_catalog::domain::{DatasetRecord, FileInfo, drs_relative_path};
use esgf_catalog::error::EsgfError;
use esgf_catalog::index::{SearchIndex, SearchQuery};
use esgf_catalog::transfer::Downloader;

struct MockIndex {
    name: String,
    records: Vec<DatasetRecord>,
    listings: BTreeMap<String, Vec<FileInfo>>,
    fail: bool,
}

impl MockIndex {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
            listings: BTreeMap::new(),
            fail: false,
        }
    }

    fn failing(name: &str) -> Self {
        let mut index = Self::new(name);
        index.fail = true;
        index
    }

    fn add(mut self, mut record: DatasetRecord, files: Vec<FileInfo>) -> Self {
        record.index_name = self.name.clone();
        self.listings.insert(record.subject.clone(), files);
        self.records.push(record);
        self
    }
}

impl SearchIndex for MockIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<DatasetRecord>, EsgfError> {
        if self.fail {
            return Err(EsgfError::SolrHttp("connection refused".to_string()));
        }
        let grouped = query.grouped_facets();
        Ok(self
            .records
            .iter()
            .filter(|record| {
                grouped.iter().all(|(name, values)| {
                    record
                        .facet(name)
                        .map(|value| values.contains(&value))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect())
    }

    fn file_listing(&self, subject: &str) -> Result<Vec<FileInfo>, EsgfError> {
        if self.fail {
            return Err(EsgfError::SolrHttp("connection refused".to_string()));
        }
        Ok(self.listings.get(subject).cloned().unwrap_or_default())
    }
}

struct CountingDownloader {
    calls: Arc<Mutex<usize>>,
    fail: bool,
}

impl CountingDownloader {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(0)),
            fail: false,
        }
    }

    fn failing() -> Self {
        let mut downloader = Self::new();
        downloader.fail = true;
        downloader
    }

    fn counter(&self) -> Arc<Mutex<usize>> {
        self.calls.clone()
    }
}

impl Downloader for CountingDownloader {
    fn download(&self, _url: &str, destination: &Utf8Path) -> Result<(), EsgfError> {
        let mut guard = self.calls.lock().unwrap();
        *guard += 1;
        if self.fail {
            return Err(EsgfError::DownloadHttp("connection reset".to_string()));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent.as_std_path()).unwrap();
        }
        fs::write(destination.as_std_path(), b"netcdf bytes").unwrap();
        Ok(())
    }
}

struct PathOpener;

impl DatasetOpener for PathOpener {
    type Dataset = Vec<Utf8PathBuf>;

    fn open(&self, path: &Utf8Path) -> Result<Self::Dataset, EsgfError> {
        Ok(vec![path.to_path_buf()])
    }

    fn open_multi(&self, paths: &[Utf8PathBuf]) -> Result<Self::Dataset, EsgfError> {
        Ok(paths.to_vec())
    }
}

struct FailingOpener;

impl DatasetOpener for FailingOpener {
    type Dataset = ();

    fn open(&self, _path: &Utf8Path) -> Result<Self::Dataset, EsgfError> {
        Err(EsgfError::Dataset("corrupt header".to_string()))
    }

    fn open_multi(&self, _paths: &[Utf8PathBuf]) -> Result<Self::Dataset, EsgfError> {
        Err(EsgfError::Dataset("corrupt header".to_string()))
    }
}

fn record(source_id: &str, member_id: &str, variable_id: &str, data_node: &str) -> DatasetRecord {
    let master = format!(
        "CMIP6.CMIP.TEST.{source_id}.historical.{member_id}.Amon.{variable_id}.gn.v20190308"
    );
    DatasetRecord {
        id: format!("{master}|{data_node}"),
        version: "20190308".to_string(),
        data_node: data_node.to_string(),
        subject: format!("{master}|{data_node}"),
        index_name: String::new(),
        facets: [
            ("activity_id", "CMIP"),
            ("source_id", source_id),
            ("experiment_id", "historical"),
            ("member_id", member_id),
            ("table_id", "Amon"),
            ("variable_id", variable_id),
            ("grid_label", "gn"),
        ]
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect(),
    }
}

fn file_for(record: &DatasetRecord, suffix: &str) -> FileInfo {
    let filename = format!(
        "{}_Amon_{}_{suffix}.nc",
        record.facet("variable_id").unwrap(),
        record.facet("source_id").unwrap()
    );
    FileInfo {
        filename: filename.clone(),
        relative_path: drs_relative_path(&record.id, &filename),
        urls: vec![format!(
            "https://{}/thredds/fileServer/{filename}",
            record.data_node
        )],
        size: Some(1024),
    }
}

fn test_config(cache: &Utf8Path) -> CatalogConfig {
    CatalogConfig::with_local_cache(cache.to_path_buf())
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

#[test]
fn search_tolerates_a_failing_backend() {
    let temp = tempfile::tempdir().unwrap();
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let files = vec![file_for(&tas, "185001-201412")];
    let indices: Vec<Box<dyn SearchIndex>> = vec![
        Box::new(MockIndex::failing("llnl")),
        Box::new(MockIndex::new("ornl").add(tas, files)),
    ];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&utf8(temp.path())),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));
    assert_eq!(catalog.records().unwrap().len(), 1);
    assert_eq!(catalog.records().unwrap().records()[0].index_name, "ornl");
}

#[test]
fn search_with_every_backend_failing_yields_empty_set() {
    let temp = tempfile::tempdir().unwrap();
    let indices: Vec<Box<dyn SearchIndex>> = vec![
        Box::new(MockIndex::failing("llnl")),
        Box::new(MockIndex::failing("ornl")),
    ];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&utf8(temp.path())),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));
    assert!(catalog.records().unwrap().is_empty());
    let err = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap_err();
    assert_matches!(err, EsgfError::EmptyCatalog);
}

#[test]
fn replicas_collapse_to_the_earlier_index() {
    let temp = tempfile::tempdir().unwrap();
    let llnl_copy = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let ornl_copy = record("CESM2", "r1i1p1f1", "tas", "esgf-node.ornl.gov");
    let indices: Vec<Box<dyn SearchIndex>> = vec![
        Box::new(MockIndex::new("llnl").add(llnl_copy.clone(), vec![file_for(&llnl_copy, "all")])),
        Box::new(MockIndex::new("ornl").add(ornl_copy.clone(), vec![file_for(&ornl_copy, "all")])),
    ];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&utf8(temp.path())),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));
    let set = catalog.records().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.records()[0].data_node, "aims3.llnl.gov");
    assert_eq!(set.records()[0].index_name, "llnl");
}

#[test]
fn search_matches_any_value_within_a_facet() {
    let temp = tempfile::tempdir().unwrap();
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let pr = record("CESM2", "r1i1p1f1", "pr", "aims3.llnl.gov");
    let huss = record("CESM2", "r1i1p1f1", "huss", "aims3.llnl.gov");
    let index = MockIndex::new("llnl")
        .add(tas, Vec::new())
        .add(pr, Vec::new())
        .add(huss, Vec::new());
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(index)];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&utf8(temp.path())),
    );
    catalog.search(&SearchQuery::new().facet_values("variable_id", &["tas", "pr"]));
    let set = catalog.records().unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.distinct_values("variable_id"), ["pr", "tas"]);
}

#[test]
fn local_root_hit_never_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let root = utf8(&temp.path().join("mirror"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let file = file_for(&tas, "185001-201412");
    let mirrored = root.join(&file.relative_path);
    fs::create_dir_all(mirrored.parent().unwrap().as_std_path()).unwrap();
    fs::write(mirrored.as_std_path(), b"mirrored bytes").unwrap();

    let indices: Vec<Box<dyn SearchIndex>> =
        vec![Box::new(MockIndex::new("llnl").add(tas, vec![file]))];
    let downloader = CountingDownloader::new();
    let calls = downloader.counter();
    let mut catalog = Catalog::with_parts(indices, downloader, test_config(&cache));
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));
    catalog.set_esgf_data_root(root.clone()).unwrap();

    let datasets = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), 0);
    let paths = datasets.values().next().unwrap().dataset().unwrap();
    assert_eq!(paths, &vec![mirrored]);
}

#[test]
fn cache_miss_downloads_once_then_reuses() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let files = vec![file_for(&tas, "185001-194912"), file_for(&tas, "195001-201412")];

    let indices: Vec<Box<dyn SearchIndex>> =
        vec![Box::new(MockIndex::new("llnl").add(tas, files))];
    let downloader = CountingDownloader::new();
    let calls = downloader.counter();
    let mut catalog = Catalog::with_parts(indices, downloader, test_config(&cache));
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let datasets = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);
    let paths = datasets.values().next().unwrap().dataset().unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|path| path.starts_with(&cache)));

    let again = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);
    assert_eq!(again.len(), 1);
}

#[test]
fn unresolvable_records_are_marked_not_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let available = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let orphan = record("CanESM5", "r1i1p1f1", "tas", "crd.climate.ca");
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(
        MockIndex::new("llnl")
            .add(available.clone(), vec![file_for(&available, "all")])
            .add(orphan, Vec::new()),
    )];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let datasets = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert_eq!(datasets.len(), 2);
    assert!(datasets["CanESM5"].is_unavailable());
    assert!(datasets["CESM2"].dataset().is_some());
}

#[test]
fn failed_downloads_surface_as_unavailable() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let indices: Vec<Box<dyn SearchIndex>> =
        vec![Box::new(MockIndex::new("llnl").add(tas.clone(), vec![file_for(&tas, "all")]))];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::failing(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let datasets = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert!(datasets.values().next().unwrap().is_unavailable());
}

#[test]
fn opener_failures_propagate() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let indices: Vec<Box<dyn SearchIndex>> =
        vec![Box::new(MockIndex::new("llnl").add(tas.clone(), vec![file_for(&tas, "all")]))];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let err = catalog
        .to_dataset_dict(&FailingOpener, &DatasetDictOptions::default())
        .unwrap_err();
    assert_matches!(err, EsgfError::Dataset(_));
}

#[test]
fn minimal_keys_use_only_discriminating_facets() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let cesm = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let canesm = record("CanESM5", "r1i1p1f1", "tas", "crd.climate.ca");
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(
        MockIndex::new("llnl")
            .add(cesm.clone(), vec![file_for(&cesm, "all")])
            .add(canesm.clone(), vec![file_for(&canesm, "all")]),
    )];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let datasets = catalog
        .to_dataset_dict(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    let keys = datasets.keys().cloned().collect::<Vec<_>>();
    assert_eq!(keys, ["CanESM5", "CESM2"]);

    let full = catalog
        .to_dataset_dict(
            &PathOpener,
            &DatasetDictOptions {
                minimal_keys: false,
                ..DatasetDictOptions::default()
            },
        )
        .unwrap();
    assert!(full.contains_key("CMIP.CESM2.historical.r1i1p1f1.Amon.tas.gn"));
}

#[test]
fn colliding_keys_keep_the_later_row() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let pr = record("CESM2", "r1i1p1f1", "pr", "aims3.llnl.gov");
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(
        MockIndex::new("llnl")
            .add(tas.clone(), vec![file_for(&tas, "all")])
            .add(pr.clone(), vec![file_for(&pr, "all")]),
    )];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet_values("variable_id", &["tas", "pr"]));

    let datasets = catalog
        .to_dataset_dict(
            &PathOpener,
            &DatasetDictOptions {
                ignore_facets: vec!["variable_id".to_string()],
                ..DatasetDictOptions::default()
            },
        )
        .unwrap();
    assert_eq!(datasets.len(), 1);
}

#[test]
fn datatree_nests_keys_on_slashes() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let pr = record("CESM2", "r1i1p1f1", "pr", "aims3.llnl.gov");
    let canesm = record("CanESM5", "r1i1p1f1", "tas", "crd.climate.ca");
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(
        MockIndex::new("llnl")
            .add(tas.clone(), vec![file_for(&tas, "all")])
            .add(pr.clone(), vec![file_for(&pr, "all")])
            .add(canesm.clone(), vec![file_for(&canesm, "all")]),
    )];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet_values("variable_id", &["tas", "pr"]));

    let tree = catalog
        .to_datatree(&PathOpener, &DatasetDictOptions::default())
        .unwrap();
    assert_eq!(tree.len(), 3);
    assert!(tree.get("CESM2/tas").is_some());
    assert!(tree.get("CESM2/pr").is_some());
    assert!(tree.get("CanESM5/tas").is_some());
}

#[test]
fn completeness_and_ensemble_pipeline() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let mut index = MockIndex::new("llnl");
    for member in ["r1i1p1f1", "r2i1p1f1"] {
        for variable in ["cSoil", "cVeg", "gpp", "lai", "nbp"] {
            let full = record("CESM2", member, variable, "aims3.llnl.gov");
            index = index.add(full, Vec::new());
        }
    }
    for variable in ["cSoil", "cVeg", "gpp"] {
        let partial = record("CanESM5", "r1i1p1f1", variable, "crd.climate.ca");
        index = index.add(partial, Vec::new());
    }
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(index)];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet_values(
        "variable_id",
        &["cSoil", "cVeg", "gpp", "lai", "nbp", "netAtmosLandCO2Flux"],
    ));
    assert_eq!(catalog.records().unwrap().len(), 13);

    catalog.remove_incomplete(|group| {
        let variables = group
            .iter()
            .filter_map(|record| record.facet("variable_id"))
            .collect::<Vec<_>>();
        ["cSoil", "cVeg", "gpp", "lai"]
            .iter()
            .all(|variable| variables.contains(variable))
            && ["nbp", "netAtmosLandCO2Flux"]
                .iter()
                .any(|variable| variables.contains(variable))
    });
    assert_eq!(catalog.records().unwrap().len(), 10);

    catalog.remove_ensembles().unwrap();
    let set = catalog.records().unwrap();
    assert_eq!(set.len(), 5);
    assert_eq!(set.distinct_values("member_id"), ["r1i1p1f1"]);

    let groups = catalog.model_groups();
    assert_eq!(groups.len(), 1);
    let key = (
        "CESM2".to_string(),
        "r1i1p1f1".to_string(),
        "gn".to_string(),
    );
    assert_eq!(groups[&key], 5);
}

#[test]
fn unique_lists_values_per_facet_column() {
    let temp = tempfile::tempdir().unwrap();
    let cache = utf8(&temp.path().join("cache"));
    let tas = record("CESM2", "r1i1p1f1", "tas", "aims3.llnl.gov");
    let canesm = record("CanESM5", "r2i1p1f1", "tas", "crd.climate.ca");
    let indices: Vec<Box<dyn SearchIndex>> = vec![Box::new(
        MockIndex::new("llnl")
            .add(tas, Vec::new())
            .add(canesm, Vec::new()),
    )];
    let mut catalog = Catalog::with_parts(
        indices,
        CountingDownloader::new(),
        test_config(&cache),
    );
    catalog.search(&SearchQuery::new().facet("variable_id", "tas"));

    let unique = catalog.unique();
    let columns = unique
        .iter()
        .map(|(column, _)| column.as_str())
        .collect::<Vec<_>>();
    assert!(columns.contains(&"source_id"));
    assert!(!columns.contains(&"version"));
    assert!(!columns.contains(&"data_node"));
    let (_, sources) = unique
        .iter()
        .find(|(column, _)| column == "source_id")
        .unwrap();
    assert_eq!(sources, &vec!["CESM2".to_string(), "CanESM5".to_string()]);
}
