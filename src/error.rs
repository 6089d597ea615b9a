use thiserror::Error;

/// Batch error
///
/// Every failure surfaced by readers, processors, writers, tasklets and the
/// flow orchestrator is one of these variants. Step and branch failures keep
/// the underlying error as their `source`, so the failing component and the
/// original error kind are both reported.
#[derive(Error, Debug)]
pub enum BatchError {
    /// A raw input line does not match the declared record schema.
    #[error("MalformedRecord: {0}")]
    MalformedRecord(String),

    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("Tasklet from: {0}")]
    Tasklet(String),

    /// A step failed; `source` is the error that failed it.
    #[error("step '{name}' failed: {source}")]
    Step {
        name: String,
        #[source]
        source: Box<BatchError>,
    },

    /// A forked branch of a split failed; `source` is the step failure.
    #[error("branch '{name}' failed: {source}")]
    Branch {
        name: String,
        #[source]
        source: Box<BatchError>,
    },
}

impl BatchError {
    /// Walks the `source` chain down to the error that originally failed.
    pub fn root_cause(&self) -> &BatchError {
        match self {
            BatchError::Step { source, .. } | BatchError::Branch { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}
