pub mod annotate;
pub mod app;
pub mod article;
pub mod columns;
pub mod config;
pub mod domain;
pub mod emitter;
pub mod error;
pub mod gene_index;
pub mod ledger;
pub mod lineage;
pub mod ntriples;
pub mod output;
pub mod report;
pub mod stages;
pub mod store;
pub mod suitability;
pub mod table;
pub mod uuid_store;
pub mod workbook;
