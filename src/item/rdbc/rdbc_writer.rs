use log::{debug, error};
use sqlx::{Any, Pool, QueryBuilder};

use crate::{
    core::item::{ItemWriter, ItemWriterResult},
    error::BatchError,
    item::rdbc::RdbcItemBinder,
};

// The number of bind parameters in databases must fit in a reasonable limit.
const BIND_LIMIT: usize = 65535;

/// A bulk-insert writer for relational databases.
///
/// Each `write` call receives exactly one chunk and issues one parameterized
/// `INSERT` statement for it, inside its own transaction: either every
/// record of the chunk is durably written or none is. The transaction and
/// its connection are taken from the pool only for the duration of the
/// chunk's commit, so concurrently executing branches can share the pool as
/// long as its maximum size covers the configured concurrency.
pub struct RdbcItemWriter<'a, O> {
    pool: &'a Pool<Any>,
    table: &'a str,
    columns: Vec<&'a str>,
    item_binder: &'a dyn RdbcItemBinder<O>,
}

impl<O: Send + Sync> ItemWriter<O> for RdbcItemWriter<'_, O> {
    /// Writes one chunk of items in a single transaction.
    ///
    /// # Returns
    /// - `Ok(())` when the chunk was committed
    /// - `Err(BatchError::ItemWriter)` when the insert or the commit failed;
    ///   the transaction is rolled back and no item of the chunk is
    ///   persisted
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        // A truncated chunk would break all-or-nothing semantics, so a chunk
        // that cannot be bound in one statement is an error.
        if items.len() * self.columns.len() > BIND_LIMIT {
            return Err(BatchError::ItemWriter(format!(
                "chunk of {} items exceeds the {} bind parameter limit",
                items.len(),
                BIND_LIMIT
            )));
        }

        let mut query_builder = insert_statement(self.table, &self.columns, items, self.item_binder);
        let query = query_builder.build();

        // The step loop is synchronous; bridge into the async pool for the
        // duration of this chunk's transaction.
        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut tx = self.pool.begin().await?;
                query.execute(&mut *tx).await?;
                tx.commit().await
            })
        });

        match result {
            Ok(()) => {
                debug!(
                    "Committed chunk of {} items to table {}",
                    items.len(),
                    self.table
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to write chunk to table {}: {}", self.table, e);
                Err(BatchError::ItemWriter(format!(
                    "insert into {} failed: {}",
                    self.table, e
                )))
            }
        }
    }
}

/// Builds the parameterized bulk `INSERT` for one chunk.
fn insert_statement<'q, O>(
    table: &str,
    columns: &[&str],
    items: &'q [O],
    item_binder: &dyn RdbcItemBinder<O>,
) -> QueryBuilder<'q, Any> {
    let mut query_builder = QueryBuilder::new("INSERT INTO ");

    query_builder.push(table);
    query_builder.push(" (");
    query_builder.push(columns.join(","));
    query_builder.push(") ");

    query_builder.push_values(items.iter(), |b, item| {
        item_binder.bind(item, b);
    });

    query_builder
}

/// Builder for an [`RdbcItemWriter`].
///
/// Table, columns, pool and item binder are all mandatory; `build` panics
/// when one is missing, since an unconfigured writer is a wiring error, not
/// a runtime condition.
#[derive(Default)]
pub struct RdbcItemWriterBuilder<'a, T> {
    pool: Option<&'a Pool<Any>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn RdbcItemBinder<T>>,
}

impl<'a, T> RdbcItemWriterBuilder<'a, T> {
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    /// Sets the destination table name.
    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Sets the connection pool the writer takes its transactions from.
    pub fn pool(mut self, pool: &'a Pool<Any>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Sets the binder mapping an item's fields to the insert parameters.
    pub fn item_binder(mut self, item_binder: &'a dyn RdbcItemBinder<T>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    /// Adds a destination column; call once per column, in insert order.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> RdbcItemWriter<'a, T> {
        if self.columns.is_empty() {
            panic!("One or more columns are required");
        }

        RdbcItemWriter {
            pool: self.pool.expect("Pool is mandatory"),
            table: self.table.expect("Table name is mandatory"),
            columns: self.columns,
            item_binder: self.item_binder.expect("Item binder is mandatory"),
        }
    }
}
