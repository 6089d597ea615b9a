//! Relational database output support.
//!
//! The [`rdbc_writer`] module provides the bulk-insert item writer used as
//! the sink of chunk-oriented steps. It is database-agnostic through the
//! SQLx `Any` driver: the concrete backend is selected by the connection
//! pool handed to the builder.

use sqlx::{Any, query_builder::Separated};

pub mod rdbc_writer;

/// Trait for binding one item's fields to the parameters of a bulk insert.
///
/// Implementations push one value per configured column, in column order.
/// Values are pushed by value (clone scalars and strings out of the item);
/// the builder does not borrow from the item.
pub trait RdbcItemBinder<T>: Send + Sync {
    fn bind(&self, item: &T, query_builder: Separated<Any, &str>);
}

pub use rdbc_writer::{RdbcItemWriter, RdbcItemWriterBuilder};
