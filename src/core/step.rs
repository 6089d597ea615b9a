use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::BatchError;

use super::{
    chunk::{Chunk, ChunkStatus},
    item::{ItemProcessor, ItemReader, ItemWriter, PassThroughProcessor},
};

/// Status of a step execution.
///
/// A step starts in `Starting`, moves to `Started` when it begins running and
/// ends in `Success` or in the status naming the component that failed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Status of a step prior to its execution.
    Starting,
    /// Status of a step that is running.
    Started,
    /// The step completed successfully.
    Success,
    /// The step failed while reading items.
    ReadError,
    /// The step failed while processing items.
    ProcessorError,
    /// The step failed while writing items.
    WriteError,
    /// The step failed inside its tasklet.
    TaskletError,
}

/// Execution record of one step run: identity, terminal status, timing and
/// item counts.
#[derive(Debug)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Name of the executed step
    pub name: String,
    /// Current status of the step execution
    pub status: StepStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of items successfully read
    pub read_count: usize,
    /// Number of items successfully written
    pub write_count: usize,
    /// Number of errors encountered during reading
    pub read_error_count: usize,
    /// Number of errors encountered during processing
    pub process_error_count: usize,
    /// Number of errors encountered during writing
    pub write_error_count: usize,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: StepStatus::Starting,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            read_count: 0,
            write_count: 0,
            read_error_count: 0,
            process_error_count: 0,
            write_error_count: 0,
        }
    }
}

/// A named unit of execution inside a flow.
///
/// A step is terminal: it either completes successfully or fails. The two
/// implementations are [`ChunkOrientedStep`] and [`TaskletStep`]. Steps must
/// be `Send + Sync` because the branches of a split execute them on worker
/// pool threads.
pub trait Step: Send + Sync {
    /// The configured step name, used for failure attribution.
    fn name(&self) -> &str;

    /// Executes the step, recording progress into `execution`.
    ///
    /// # Returns
    /// - `Ok(())` when the step completed successfully
    /// - `Err(BatchError)` with the error that failed the step
    fn execute(&self, execution: &mut StepExecution) -> Result<(), BatchError>;
}

/// Outcome of one tasklet invocation.
pub enum RepeatStatus {
    /// The tasklet wants to be invoked again.
    Continuable,
    /// The tasklet has finished executing.
    Finished,
}

/// A single-shot, non-chunked unit of step work.
///
/// Tasklets carry no structured input or output beyond the side effect they
/// perform; the owning step invokes `execute` until it returns
/// [`RepeatStatus::Finished`].
pub trait Tasklet: Send + Sync {
    fn execute(&self, execution: &StepExecution) -> Result<RepeatStatus, BatchError>;
}

/// Step executing one [`Tasklet`] to completion.
pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl Step for TaskletStep<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        execution.status = StepStatus::Started;

        info!("Start of step: {}, id: {}", execution.name, execution.id);

        let result = loop {
            match self.tasklet.execute(execution) {
                Ok(RepeatStatus::Finished) => break Ok(()),
                Ok(RepeatStatus::Continuable) => continue,
                Err(error) => {
                    warn!("Tasklet error: {}", error);
                    execution.status = StepStatus::TaskletError;
                    break Err(error);
                }
            }
        };

        if result.is_ok() {
            execution.status = StepStatus::Success;
        }

        execution.start_time = start_time;
        execution.end_time = Instant::now();
        execution.duration = start_time.elapsed();

        info!("End of step: {}, id: {}", execution.name, execution.id);

        result
    }
}

/// Step processing the full input of a reader as a sequence of chunks.
///
/// Items flow reader -> processor -> writer in source order. The writer
/// receives one chunk per `write` call, when the chunk reaches the configured
/// size or when the reader is exhausted. Errors count against the skip limit;
/// with the default limit of 0 the first error fails the step.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    /// Component responsible for reading items from the source
    reader: &'a dyn ItemReader<I>,
    /// Component responsible for processing items
    processor: &'a dyn ItemProcessor<I, O>,
    /// Component responsible for writing items to the destination
    writer: &'a dyn ItemWriter<O>,
    /// Number of items to process in each chunk
    chunk_size: u16,
    /// Maximum number of errors allowed before failing the step
    skip_limit: u16,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        execution.status = StepStatus::Started;

        info!("Start of step: {}, id: {}", execution.name, execution.id);

        let result = if let Err(error) = self.writer.open() {
            execution.status = StepStatus::WriteError;
            Err(error)
        } else {
            let chunks_result = self.run_chunks(execution);
            // The writer is closed whatever the outcome of the chunk loop.
            Self::manage_error(self.writer.close());
            chunks_result
        };

        if result.is_ok() {
            execution.status = StepStatus::Success;
        }

        execution.start_time = start_time;
        execution.end_time = Instant::now();
        execution.duration = start_time.elapsed();

        info!("End of step: {}, id: {}", execution.name, execution.id);

        result
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    /// Runs the read/process/write cycle until the reader is exhausted or an
    /// error exceeds the skip limit.
    fn run_chunks(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut chunk = Chunk::new(self.chunk_size as usize);

        loop {
            self.fill_chunk(&mut chunk, execution)?;

            let processed = self.process_chunk(chunk.items(), execution)?;

            self.write_chunk(&processed, execution)?;

            if chunk.status() == ChunkStatus::Finished {
                return Ok(());
            }

            chunk.clear();
        }
    }

    /// Reads items into the chunk until it is full or the source is
    /// exhausted.
    fn fill_chunk(
        &self,
        chunk: &mut Chunk<I>,
        execution: &mut StepExecution,
    ) -> Result<(), BatchError> {
        debug!("Start reading chunk");

        while chunk.is_open() {
            match self.reader.read() {
                Ok(Some(item)) => {
                    chunk.push(item);
                    execution.read_count += 1;
                }
                Ok(None) => chunk.finish(),
                Err(error) => {
                    warn!("Error reading item: {}", error);
                    execution.read_error_count += 1;

                    if self.is_skip_limit_reached(execution) {
                        execution.status = StepStatus::ReadError;
                        return Err(error);
                    }
                }
            }
        }

        debug!("End reading chunk: {:?}", chunk.status());
        Ok(())
    }

    /// Applies the processor to every item of the chunk, in source order.
    fn process_chunk(
        &self,
        items: &[I],
        execution: &mut StepExecution,
    ) -> Result<Vec<O>, BatchError> {
        debug!("Processing chunk of {} items", items.len());

        let mut processed = Vec::with_capacity(items.len());

        for item in items {
            match self.processor.process(item) {
                Ok(output) => processed.push(output),
                Err(error) => {
                    warn!("Error processing item: {}", error);
                    execution.process_error_count += 1;

                    if self.is_skip_limit_reached(execution) {
                        execution.status = StepStatus::ProcessorError;
                        return Err(error);
                    }
                }
            }
        }

        Ok(processed)
    }

    /// Hands one chunk to the writer. A failed chunk counts as a whole
    /// against the skip limit: the writer guarantees none of its items were
    /// persisted.
    fn write_chunk(&self, items: &[O], execution: &mut StepExecution) -> Result<(), BatchError> {
        if items.is_empty() {
            debug!("No items to write, skipping write call");
            return Ok(());
        }

        debug!("Writing chunk of {} items", items.len());

        match self.writer.write(items).and_then(|_| self.writer.flush()) {
            Ok(()) => {
                execution.write_count += items.len();
                Ok(())
            }
            Err(error) => {
                warn!("Error writing items: {}", error);
                execution.write_error_count += items.len();

                if self.is_skip_limit_reached(execution) {
                    execution.status = StepStatus::WriteError;
                    return Err(error);
                }
                Ok(())
            }
        }
    }

    fn is_skip_limit_reached(&self, execution: &StepExecution) -> bool {
        execution.read_error_count + execution.process_error_count + execution.write_error_count
            > self.skip_limit.into()
    }

    fn manage_error(result: Result<(), BatchError>) {
        if let Err(error) = result {
            warn!("Non-fatal error: {}", error);
        }
    }
}

/// Builder for a [`ChunkOrientedStep`].
pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    chunk_size: u16,
    skip_limit: u16,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            chunk_size: 10,
            skip_limit: 0,
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn chunk_size(mut self, chunk_size: u16) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn skip_limit(mut self, skip_limit: u16) -> Self {
        self.skip_limit = skip_limit;
        self
    }

    /// Builds the step. Falls back to the identity processor when none was
    /// configured.
    pub fn build(self) -> ChunkOrientedStep<'a, I, O>
    where
        PassThroughProcessor: ItemProcessor<I, O>,
    {
        let default_processor = &PassThroughProcessor {};
        ChunkOrientedStep {
            name: self.name,
            reader: self.reader.expect("Reader is required for building a step"),
            processor: self.processor.unwrap_or(default_processor),
            writer: self.writer.expect("Writer is required for building a step"),
            chunk_size: self.chunk_size,
            skip_limit: self.skip_limit,
        }
    }
}

/// Builder for a [`TaskletStep`].
pub struct TaskletBuilder<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl<'a> TaskletBuilder<'a> {
    pub fn build(self) -> TaskletStep<'a> {
        TaskletStep {
            name: self.name,
            tasklet: self.tasklet,
        }
    }
}

/// Entry point for building steps of either kind.
///
/// ```
/// use batch_flow_rs::core::step::{RepeatStatus, StepBuilder, StepExecution, Tasklet};
/// use batch_flow_rs::error::BatchError;
///
/// struct Noop;
///
/// impl Tasklet for Noop {
///     fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
///         Ok(RepeatStatus::Finished)
///     }
/// }
///
/// let tasklet = Noop;
/// let step = StepBuilder::new("noop").tasklet(&tasklet).build();
/// ```
pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Starts building a tasklet step.
    pub fn tasklet<'a>(self, tasklet: &'a dyn Tasklet) -> TaskletBuilder<'a> {
        TaskletBuilder {
            name: self.name,
            tasklet,
        }
    }

    /// Starts building a chunk-oriented step with the given commit interval.
    pub fn chunk<'a, I, O>(self, chunk_size: u16) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::core::item::{ItemReaderResult, ItemWriterResult};

    struct StubReader {
        items: Mutex<VecDeque<Result<String, BatchError>>>,
    }

    impl StubReader {
        fn of(values: &[&str]) -> Self {
            Self {
                items: Mutex::new(values.iter().map(|v| Ok(v.to_string())).collect()),
            }
        }

        fn from_results(results: Vec<Result<String, BatchError>>) -> Self {
            Self {
                items: Mutex::new(results.into()),
            }
        }
    }

    impl ItemReader<String> for StubReader {
        fn read(&self) -> ItemReaderResult<String> {
            match self.items.lock().unwrap().pop_front() {
                Some(Ok(item)) => Ok(Some(item)),
                Some(Err(error)) => Err(error),
                None => Ok(None),
            }
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        chunks: Mutex<Vec<Vec<String>>>,
    }

    impl ItemWriter<String> for RecordingWriter {
        fn write(&self, items: &[String]) -> ItemWriterResult {
            self.chunks.lock().unwrap().push(items.to_vec());
            Ok(())
        }
    }

    struct FailingWriter;

    impl ItemWriter<String> for FailingWriter {
        fn write(&self, _items: &[String]) -> ItemWriterResult {
            Err(BatchError::ItemWriter("constraint violation".to_string()))
        }
    }

    #[test]
    fn six_records_with_chunk_size_five_flush_chunks_of_five_and_one() {
        let reader = StubReader::of(&["1", "2", "3", "4", "5", "6"]);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        let chunks = writer.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 5);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(execution.status, StepStatus::Success);
        assert_eq!(execution.read_count, 6);
        assert_eq!(execution.write_count, 6);
    }

    #[test]
    fn six_records_with_chunk_size_ten_flush_one_chunk() {
        let reader = StubReader::of(&["1", "2", "3", "4", "5", "6"]);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("reimport")
            .chunk::<String, String>(10)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        let chunks = writer.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 6);
    }

    #[test]
    fn record_count_divisible_by_chunk_size_flushes_exact_chunks() {
        let values: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let value_refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let reader = StubReader::of(&value_refs);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        let chunks = writer.chunks.lock().unwrap();
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 5]);
    }

    #[test]
    fn empty_source_completes_without_writing() {
        let reader = StubReader::of(&[]);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        assert!(writer.chunks.lock().unwrap().is_empty());
        assert_eq!(execution.status, StepStatus::Success);
    }

    #[test]
    fn malformed_record_fails_the_step() {
        let reader = StubReader::from_results(vec![
            Ok("1".to_string()),
            Err(BatchError::MalformedRecord("2 fields, expected 3".to_string())),
        ]);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        let error = step.execute(&mut execution).unwrap_err();

        assert!(matches!(error, BatchError::MalformedRecord(_)));
        assert_eq!(execution.status, StepStatus::ReadError);
        // The failing chunk never reaches the writer.
        assert!(writer.chunks.lock().unwrap().is_empty());
    }

    #[test]
    fn write_error_fails_the_step() {
        let reader = StubReader::of(&["1", "2"]);
        let writer = FailingWriter;

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        let error = step.execute(&mut execution).unwrap_err();

        assert!(matches!(error, BatchError::ItemWriter(_)));
        assert_eq!(execution.status, StepStatus::WriteError);
        assert_eq!(execution.write_error_count, 2);
        assert_eq!(execution.write_count, 0);
    }

    #[test]
    fn skip_limit_tolerates_read_errors() {
        let reader = StubReader::from_results(vec![
            Ok("1".to_string()),
            Err(BatchError::ItemReader("bad line".to_string())),
            Ok("2".to_string()),
        ]);
        let writer = RecordingWriter::default();

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .writer(&writer)
            .skip_limit(1)
            .build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        assert_eq!(execution.status, StepStatus::Success);
        assert_eq!(execution.read_count, 2);
        assert_eq!(execution.read_error_count, 1);
        assert_eq!(writer.chunks.lock().unwrap()[0].len(), 2);
    }

    struct RejectingProcessor;

    impl ItemProcessor<String, String> for RejectingProcessor {
        fn process(&self, item: &String) -> Result<String, BatchError> {
            if item == "bad" {
                Err(BatchError::ItemProcessor("rejected".to_string()))
            } else {
                Ok(item.clone())
            }
        }
    }

    #[test]
    fn processor_rejection_fails_the_step_at_default_skip_limit() {
        let reader = StubReader::of(&["ok", "bad"]);
        let writer = RecordingWriter::default();
        let processor = RejectingProcessor;

        let step = StepBuilder::new("import")
            .chunk::<String, String>(5)
            .reader(&reader)
            .processor(&processor)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.name());
        let error = step.execute(&mut execution).unwrap_err();

        assert!(matches!(error, BatchError::ItemProcessor(_)));
        assert_eq!(execution.status, StepStatus::ProcessorError);
    }

    struct CountingTasklet {
        remaining: AtomicUsize,
        invocations: AtomicUsize,
    }

    impl Tasklet for CountingTasklet {
        fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 1 {
                Ok(RepeatStatus::Continuable)
            } else {
                Ok(RepeatStatus::Finished)
            }
        }
    }

    #[test]
    fn tasklet_repeats_until_finished() {
        let tasklet = CountingTasklet {
            remaining: AtomicUsize::new(3),
            invocations: AtomicUsize::new(0),
        };

        let step = StepBuilder::new("cleanup").tasklet(&tasklet).build();

        let mut execution = StepExecution::new(step.name());
        step.execute(&mut execution).unwrap();

        assert_eq!(execution.status, StepStatus::Success);
        assert_eq!(tasklet.invocations.load(Ordering::SeqCst), 3);
    }

    struct FailingTasklet;

    impl Tasklet for FailingTasklet {
        fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
            Err(BatchError::Tasklet("boom".to_string()))
        }
    }

    #[test]
    fn tasklet_failure_fails_the_step() {
        let tasklet = FailingTasklet;

        let step = StepBuilder::new("cleanup").tasklet(&tasklet).build();

        let mut execution = StepExecution::new(step.name());
        let error = step.execute(&mut execution).unwrap_err();

        assert!(matches!(error, BatchError::Tasklet(_)));
        assert_eq!(execution.status, StepStatus::TaskletError);
    }
}
