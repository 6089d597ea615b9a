//! Delimited-text input support.
//!
//! The [`csv_reader`] module turns a line-oriented, delimited input into a
//! stream of typed records via Serde, with a declared field schema, a
//! configurable delimiter and a number of leading lines to skip.

pub mod csv_reader;

pub use csv_reader::{CsvItemReader, CsvItemReaderBuilder};
