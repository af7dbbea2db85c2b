pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod importer;
pub mod output;
pub mod page;
pub mod rdf;
pub mod scheduler;
