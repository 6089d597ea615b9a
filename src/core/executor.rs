use std::thread;

use crossbeam_channel::bounded;
use log::debug;

/// Bounded pool of named worker threads used to run the branches of a split.
///
/// The pool is sized by a core and a maximum thread count: the core threads
/// are always made available to a split, and the pool grows toward the
/// maximum only when more branches are queued than the core threads can
/// service. Branches submitted beyond the maximum wait in the queue until a
/// worker frees up.
///
/// Workers live for the duration of one `execute` call; they borrow the
/// submitted tasks, so no `'static` bound is required on the work.
pub struct TaskExecutor {
    core_pool_size: usize,
    max_pool_size: usize,
    thread_name_prefix: String,
}

impl TaskExecutor {
    /// Runs every task on the pool and returns their results in submission
    /// order. Blocks until the last task has reported a result: this is the
    /// join barrier of a split.
    pub fn execute<F, T>(&self, tasks: Vec<F>) -> Vec<T>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        let task_count = tasks.len();
        if task_count == 0 {
            return Vec::new();
        }

        let workers = self.worker_count(task_count);
        debug!("Executing {} tasks on {} workers", task_count, workers);

        let (task_tx, task_rx) = bounded::<(usize, F)>(task_count);
        let (result_tx, result_rx) = bounded::<(usize, T)>(task_count);

        for task in tasks.into_iter().enumerate() {
            task_tx
                .send(task)
                .expect("task queue has capacity for every task");
        }
        // Workers drain the queue and exit when it disconnects.
        drop(task_tx);

        thread::scope(|scope| {
            for worker in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();

                thread::Builder::new()
                    .name(format!("{}-{}", self.thread_name_prefix, worker + 1))
                    .spawn_scoped(scope, move || {
                        while let Ok((index, task)) = task_rx.recv() {
                            let result = task();
                            if result_tx.send((index, result)).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn worker thread");
            }
            drop(result_tx);

            let mut results: Vec<Option<T>> = (0..task_count).map(|_| None).collect();
            for _ in 0..task_count {
                match result_rx.recv() {
                    Ok((index, result)) => results[index] = Some(result),
                    // A worker panicked; the scope re-raises its panic once
                    // the remaining threads are joined.
                    Err(_) => break,
                }
            }

            results
                .into_iter()
                .map(|result| result.expect("a worker thread died before reporting its result"))
                .collect()
        })
    }

    fn worker_count(&self, queued: usize) -> usize {
        let max = self.max_pool_size.max(1);
        let core = self.core_pool_size.clamp(1, max);
        queued.min(max).max(core)
    }
}

/// Builder for a [`TaskExecutor`].
///
/// ```
/// use batch_flow_rs::core::executor::TaskExecutorBuilder;
///
/// let executor = TaskExecutorBuilder::new()
///     .core_pool_size(2)
///     .max_pool_size(3)
///     .thread_name_prefix("job-thread")
///     .build();
///
/// let doubled = executor.execute((0..4).map(|i| move || i * 2).collect());
/// assert_eq!(doubled, vec![0, 2, 4, 6]);
/// ```
pub struct TaskExecutorBuilder {
    core_pool_size: usize,
    max_pool_size: usize,
    thread_name_prefix: String,
}

impl Default for TaskExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutorBuilder {
    pub fn new() -> Self {
        let parallelism = thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            core_pool_size: 1,
            max_pool_size: parallelism,
            thread_name_prefix: "batch-worker".to_string(),
        }
    }

    /// Number of threads always made available to a split.
    pub fn core_pool_size(mut self, core_pool_size: usize) -> Self {
        self.core_pool_size = core_pool_size;
        self
    }

    /// Upper bound on concurrently running worker threads.
    pub fn max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: &str) -> Self {
        self.thread_name_prefix = prefix.to_string();
        self
    }

    pub fn build(self) -> TaskExecutor {
        TaskExecutor {
            core_pool_size: self.core_pool_size,
            max_pool_size: self.max_pool_size,
            thread_name_prefix: self.thread_name_prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(core: usize, max: usize) -> TaskExecutor {
        TaskExecutorBuilder::new()
            .core_pool_size(core)
            .max_pool_size(max)
            .build()
    }

    #[test]
    fn results_come_back_in_submission_order() {
        let executor = executor(2, 3);

        let tasks: Vec<_> = (0..10).map(|i| move || i * 2).collect();
        let results = executor.execute(tasks);

        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn more_tasks_than_the_maximum_pool_size_all_complete() {
        let executor = executor(2, 3);

        let tasks: Vec<_> = (0..16).map(|i| move || i + 1).collect();
        let results = executor.execute(tasks);

        assert_eq!(results.len(), 16);
    }

    #[test]
    fn no_tasks_means_no_workers() {
        let executor = executor(2, 3);

        let results: Vec<i32> = executor.execute(Vec::<fn() -> i32>::new());

        assert!(results.is_empty());
    }

    #[test]
    fn pool_grows_from_core_to_max() {
        let executor = executor(2, 3);

        assert_eq!(executor.worker_count(1), 2);
        assert_eq!(executor.worker_count(2), 2);
        assert_eq!(executor.worker_count(3), 3);
        assert_eq!(executor.worker_count(10), 3);
    }

    #[test]
    fn workers_carry_the_configured_name_prefix() {
        let executor = TaskExecutorBuilder::new()
            .thread_name_prefix("job-thread")
            .build();

        let names = executor.execute(vec![
            || thread::current().name().map(str::to_string),
            || thread::current().name().map(str::to_string),
        ]);

        for name in names {
            assert!(name.unwrap().starts_with("job-thread-"));
        }
    }
}
