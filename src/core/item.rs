use crate::error::BatchError;

/// Result of a single read attempt: `Ok(None)` signals end of input.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

/// Result of processing one item.
pub type ItemProcessorResult<O> = Result<O, BatchError>;

/// Result of writing one chunk of items.
pub type ItemWriterResult = Result<(), BatchError>;

/// Produces the input items of a chunk-oriented step, one at a time.
///
/// Implementations own their cursor state behind interior mutability so that
/// `read` can be called through a shared reference; the state must be
/// thread-safe because steps may execute on the worker pool of a split.
/// A reader is finite and not restartable mid-stream: build a fresh reader
/// for every step execution that consumes the same source.
pub trait ItemReader<I>: Send + Sync {
    /// Reads the next item.
    ///
    /// # Returns
    /// - `Ok(Some(item))` when an item was read
    /// - `Ok(None)` when the input is exhausted
    /// - `Err(BatchError)` when the item could not be produced
    fn read(&self) -> ItemReaderResult<I>;
}

/// Transforms one input item into one output item.
///
/// The default configuration of a step uses [`PassThroughProcessor`]; custom
/// implementations may modify the item or reject it by returning an error,
/// which counts against the step's skip limit.
pub trait ItemProcessor<I, O>: Send + Sync {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Writes the items of one chunk to the destination.
///
/// `write` receives exactly one chunk per call and is the unit of atomicity:
/// transactional writers must persist either every item of the slice or none.
pub trait ItemWriter<O>: Send + Sync {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Identity processor used when a step declares no processor of its own.
#[derive(Default)]
pub struct PassThroughProcessor {}

impl<I: Clone + Send + Sync> ItemProcessor<I, I> for PassThroughProcessor {
    fn process(&self, item: &I) -> ItemProcessorResult<I> {
        Ok(item.clone())
    }
}
