pub mod catalog;
pub mod combine;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod globus;
pub mod index;
pub mod keys;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod resolve;
pub mod select;
pub mod solr;
pub mod transfer;
