use log::{info, warn};

use crate::BatchError;

use super::{
    executor::TaskExecutor,
    step::{Step, StepExecution},
};

/// One node of a flow: a step, or a split forking into branch sub-flows.
pub enum FlowNode<'a> {
    Step(&'a dyn Step),
    Split(Split<'a>),
}

/// Fork/join construct: the branch flows execute concurrently on the worker
/// pool, and the node after the split becomes eligible only once every
/// branch has reached a terminal state.
pub struct Split<'a> {
    executor: &'a TaskExecutor,
    branches: Vec<Flow<'a>>,
}

impl<'a> Split<'a> {
    pub(crate) fn new(executor: &'a TaskExecutor, branches: Vec<Flow<'a>>) -> Self {
        Self { executor, branches }
    }

    /// Runs every branch to a terminal state, then reports the first branch
    /// failure, if any. A failing branch never short-circuits the barrier:
    /// the remaining branches still run to completion before the failure
    /// propagates.
    fn execute(&self, executions: &mut Vec<StepExecution>) -> Result<(), BatchError> {
        info!("Forking {} branch(es)", self.branches.len());

        let tasks: Vec<_> = self
            .branches
            .iter()
            .map(|branch| {
                move || {
                    let mut branch_executions = Vec::new();
                    let result = branch.execute(&mut branch_executions);
                    (branch.name().to_string(), branch_executions, result)
                }
            })
            .collect();

        // The executor blocks until every branch has reported: this is the
        // join barrier.
        let outcomes = self.executor.execute(tasks);

        let mut failure = None;
        for (branch_name, branch_executions, result) in outcomes {
            executions.extend(branch_executions);

            if let Err(error) = result {
                warn!("Branch '{}' failed: {}", branch_name, error);
                if failure.is_none() {
                    failure = Some(BatchError::Branch {
                        name: branch_name,
                        source: Box::new(error),
                    });
                }
            }
        }

        match failure {
            None => {
                info!("All branches completed, releasing join");
                Ok(())
            }
            Some(error) => Err(error),
        }
    }
}

/// A directed chain of sequential steps and fork/join splits.
///
/// Nodes execute in order; a step starts only after its predecessor
/// completed successfully. The first failure stops the flow: no node after
/// the failing one is started.
pub struct Flow<'a> {
    name: String,
    nodes: Vec<FlowNode<'a>>,
}

impl<'a> Flow<'a> {
    pub(crate) fn from_parts(name: String, nodes: Vec<FlowNode<'a>>) -> Self {
        Self { name, nodes }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the flow, appending one [`StepExecution`] per executed step.
    ///
    /// # Returns
    /// - `Ok(())` when every node completed
    /// - `Err(BatchError::Step)` or `Err(BatchError::Branch)` naming the
    ///   failed node, with the underlying error as its source
    pub(crate) fn execute(&self, executions: &mut Vec<StepExecution>) -> Result<(), BatchError> {
        for node in &self.nodes {
            match node {
                FlowNode::Step(step) => {
                    let mut execution = StepExecution::new(step.name());
                    let result = step.execute(&mut execution);
                    executions.push(execution);

                    if let Err(error) = result {
                        return Err(BatchError::Step {
                            name: step.name().to_string(),
                            source: Box::new(error),
                        });
                    }
                }
                FlowNode::Split(split) => split.execute(executions)?,
            }
        }

        Ok(())
    }
}

/// Builder for a linear [`Flow`], used for the branches of a split.
///
/// ```
/// use batch_flow_rs::core::flow::FlowBuilder;
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
/// let first = Noop;
/// let second = Noop;
/// let step_one = StepBuilder::new("one").tasklet(&first).build();
/// let step_two = StepBuilder::new("two").tasklet(&second).build();
///
/// let flow = FlowBuilder::new("one-then-two")
///     .start(&step_one)
///     .next(&step_two)
///     .build();
/// ```
pub struct FlowBuilder<'a> {
    name: String,
    nodes: Vec<FlowNode<'a>>,
}

impl<'a> FlowBuilder<'a> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
        }
    }

    /// Sets the first step of the flow.
    pub fn start(mut self, step: &'a dyn Step) -> Self {
        self.nodes.push(FlowNode::Step(step));
        self
    }

    /// Adds a step after the previous one.
    pub fn next(mut self, step: &'a dyn Step) -> Self {
        self.nodes.push(FlowNode::Step(step));
        self
    }

    pub fn build(self) -> Flow<'a> {
        Flow {
            name: self.name,
            nodes: self.nodes,
        }
    }
}
