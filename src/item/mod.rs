#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for debugging purposes.
pub mod logger;

#[cfg(feature = "csv")]
/// This module provides a delimited-text item reader.
pub mod csv;

#[cfg(feature = "rdbc")]
/// This module provides a relational database item writer.
pub mod rdbc;
