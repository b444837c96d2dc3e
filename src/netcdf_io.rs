use camino::{Utf8Path, Utf8PathBuf};

use crate::dataset::DatasetOpener;
use crate::error::EsgfError;

pub enum NetcdfDataset {
    Single(netcdf::File),
    Multi(Vec<netcdf::File>),
}

impl NetcdfDataset {
    pub fn file_count(&self) -> usize {
        match self {
            NetcdfDataset::Single(_) => 1,
            NetcdfDataset::Multi(files) => files.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfOpener;

impl DatasetOpener for NetcdfOpener {
    type Dataset = NetcdfDataset;

    fn open(&self, path: &Utf8Path) -> Result<NetcdfDataset, EsgfError> {
        let file =
            netcdf::open(path.as_std_path()).map_err(|err| EsgfError::Dataset(err.to_string()))?;
        Ok(NetcdfDataset::Single(file))
    }

    fn open_multi(&self, paths: &[Utf8PathBuf]) -> Result<NetcdfDataset, EsgfError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = netcdf::open(path.as_std_path())
                .map_err(|err| EsgfError::Dataset(err.to_string()))?;
            files.push(file);
        }
        Ok(NetcdfDataset::Multi(files))
    }
}
