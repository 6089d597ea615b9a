use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use log::{error, info};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    executor::TaskExecutor,
    flow::{Flow, FlowNode, Split},
    step::{Step, StepExecution},
};

/// Status of a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Status of a batch job prior to its execution.
    Starting,
    /// Status of a batch job that is running.
    Started,
    /// The batch job has successfully completed its execution.
    Completed,
    /// Status of a batch job that has failed during its execution.
    Failed,
}

/// Represents a job that can be executed.
///
/// A job is a container for a flow of steps. Running it executes the flow
/// and reports the outcome as a [`JobExecution`]; a failed run is a normal
/// return value, not a panic, so that the caller can inspect and report it.
pub trait Job {
    /// Runs the job and returns the record of this execution.
    fn run(&self) -> JobExecution;
}

/// Record of one job run: the run identifier, terminal status, timing, the
/// executions of every started step and the failure that ended the run, if
/// any.
#[derive(Debug)]
pub struct JobExecution {
    /// Identifier of this run, strictly increasing per job instance
    pub run_id: u64,
    /// Terminal status of the run
    pub status: BatchStatus,
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    /// One entry per step that started, in completion order
    pub step_executions: Vec<StepExecution>,
    /// The step or branch failure that ended the run
    pub failure: Option<BatchError>,
}

impl JobExecution {
    /// Looks up the execution of a step by name.
    pub fn step_execution(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|e| e.name == name)
    }
}

/// Issues strictly increasing run identifiers for one job instance, so that
/// repeat invocations of the same job definition can be told apart.
#[derive(Default)]
pub struct RunIdIncrementer {
    counter: AtomicU64,
}

impl RunIdIncrementer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// An executable job: one flow plus run bookkeeping.
///
/// Built through [`JobBuilder`]. The instance can be run any number of
/// times; every run is tagged with the next run identifier.
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Human-readable name for the job
    name: String,
    /// The flow executed by this job
    flow: Flow<'a>,
    incrementer: RunIdIncrementer,
}

impl Job for JobInstance<'_> {
    fn run(&self) -> JobExecution {
        let run_id = self.incrementer.next_id();
        let start = Instant::now();

        info!(
            "Start of job: {}, run id: {}, id: {}",
            self.name, run_id, self.id
        );

        let mut step_executions = Vec::new();
        let result = self.flow.execute(&mut step_executions);

        let (status, failure) = match result {
            Ok(()) => {
                info!("End of job: {}, run id: {}: COMPLETED", self.name, run_id);
                (BatchStatus::Completed, None)
            }
            Err(job_error) => {
                error!(
                    "End of job: {}, run id: {}: FAILED: {}",
                    self.name, run_id, job_error
                );
                (BatchStatus::Failed, Some(job_error))
            }
        };

        JobExecution {
            run_id,
            status,
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            step_executions,
            failure,
        }
    }
}

/// Builder assembling a job's flow from explicit step references.
///
/// Steps added with [`start`](JobBuilder::start) and
/// [`next`](JobBuilder::next) run sequentially;
/// [`split`](JobBuilder::split) forks into branch flows that run
/// concurrently on the given executor and join before the following node.
///
/// ```
/// use batch_flow_rs::core::executor::TaskExecutorBuilder;
/// use batch_flow_rs::core::flow::FlowBuilder;
/// use batch_flow_rs::core::job::{BatchStatus, Job, JobBuilder};
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
/// let (first, fork_one, fork_two, last) = (Noop, Noop, Noop, Noop);
/// let step_one = StepBuilder::new("one").tasklet(&first).build();
/// let step_two = StepBuilder::new("two").tasklet(&fork_one).build();
/// let step_three = StepBuilder::new("three").tasklet(&fork_two).build();
/// let step_four = StepBuilder::new("four").tasklet(&last).build();
///
/// let executor = TaskExecutorBuilder::new().build();
/// let branch = FlowBuilder::new("two-then-three")
///     .start(&step_two)
///     .next(&step_three)
///     .build();
///
/// let job = JobBuilder::new()
///     .name("demo")
///     .start(&step_one)
///     .split(&executor)
///     .add(branch)
///     .next(&step_four)
///     .build();
///
/// let execution = job.run();
/// assert_eq!(execution.status, BatchStatus::Completed);
/// assert_eq!(execution.run_id, 1);
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    nodes: Vec<FlowNode<'a>>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            nodes: Vec::new(),
        }
    }

    /// Sets the name of the job.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the first step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> Self {
        self.nodes.push(FlowNode::Step(step));
        self
    }

    /// Adds a step after the previous node.
    pub fn next(mut self, step: &'a dyn Step) -> Self {
        self.nodes.push(FlowNode::Step(step));
        self
    }

    /// Opens a fork: the branch flows added with
    /// [`add`](SplitBuilder::add) run concurrently on `executor`.
    pub fn split(self, executor: &'a TaskExecutor) -> SplitBuilder<'a> {
        SplitBuilder {
            job: self,
            executor,
            branches: Vec::new(),
        }
    }

    /// Builds the job instance.
    ///
    /// If no name has been provided, a random name is generated.
    pub fn build(self) -> JobInstance<'a> {
        let name = self.name.unwrap_or_else(build_name);
        JobInstance {
            id: Uuid::new_v4(),
            flow: Flow::from_parts(name.clone(), self.nodes),
            name,
            incrementer: RunIdIncrementer::new(),
        }
    }
}

/// Builder state while a split is open; closes back into the job builder on
/// [`next`](SplitBuilder::next) or [`build`](SplitBuilder::build).
pub struct SplitBuilder<'a> {
    job: JobBuilder<'a>,
    executor: &'a TaskExecutor,
    branches: Vec<Flow<'a>>,
}

impl<'a> SplitBuilder<'a> {
    /// Adds one branch flow to the split.
    pub fn add(mut self, flow: Flow<'a>) -> Self {
        self.branches.push(flow);
        self
    }

    /// Closes the split and adds the step gated by its join.
    pub fn next(self, step: &'a dyn Step) -> JobBuilder<'a> {
        let mut job = self.close();
        job.nodes.push(FlowNode::Step(step));
        job
    }

    /// Closes the split and builds the job with the join as the last node.
    pub fn build(self) -> JobInstance<'a> {
        self.close().build()
    }

    fn close(self) -> JobBuilder<'a> {
        let mut job = self.job;
        job.nodes
            .push(FlowNode::Split(Split::new(self.executor, self.branches)));
        job
    }
}
