#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Batch Flow for Rust

 A toolkit for building batch jobs whose steps are wired into a flow graph:
 ordinary sequential edges, plus fork/join splits whose branches execute
 concurrently on a bounded worker pool. The chunk-oriented processing model
 (read, process, write in fixed-size committed batches) follows the classic
 enterprise batch architecture.

 ## Core Concepts

 - **Job:** Represents the entire batch process. A `Job` owns one `Flow` and
   tags every run with a strictly increasing run identifier.
 - **Flow:** A chain of `Step`s with optional `Split` nodes. The node after a
   split starts only once every forked branch has completed; a failed branch
   fails the job.
 - **Step:** An independent phase of a job, either chunk-oriented (reader,
   processor, writer) or a single-shot `Tasklet`.
 - **ItemReader:** The retrieval of input for a step, one item at a time.
 - **ItemProcessor:** The per-item transformation between reading and
   writing; identity by default.
 - **ItemWriter:** The output of a step, one chunk of items at a time. A
   chunk is the unit of transactional atomicity.
 - **TaskExecutor:** The bounded pool of named worker threads that runs the
   branches of a split.

 ## Features

 The crate is modular, allowing you to enable only the features you need:

 | **Feature**   | **Description**                                          |
 |---------------|----------------------------------------------------------|
 | csv           | Enables the delimited-text `ItemReader`                  |
 | rdbc-postgres | Enables the transactional `ItemWriter` for PostgreSQL    |
 | rdbc-mysql    | Enables the transactional `ItemWriter` for MySQL/MariaDB |
 | rdbc-sqlite   | Enables the transactional `ItemWriter` for SQLite        |
 | logger        | Enables a logger `ItemWriter`, useful for debugging      |
 | full          | Enables all available features                           |

 ## Getting Started

 Make sure you activated the suitable features on Cargo.toml:

```toml
[dependencies]
batch-flow-rs = { version = "<version>", features = ["<full|csv|logger>"] }
```

 Then, on your main.rs:

```rust
# use serde::Deserialize;
# use batch_flow_rs::{
#     core::{
#         executor::TaskExecutorBuilder,
#         flow::FlowBuilder,
#         job::{BatchStatus, Job, JobBuilder},
#         step::{RepeatStatus, StepBuilder, StepExecution, Tasklet},
#     },
#     error::BatchError,
#     item::{csv::csv_reader::CsvItemReaderBuilder, logger::LoggerWriter},
# };
# #[derive(Debug, Deserialize, Clone)]
# struct User {
#     userid: i32,
#     username: String,
#     emailid: String,
# }
# struct Placeholder;
# impl Tasklet for Placeholder {
#     fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
#         Ok(RepeatStatus::Finished)
#     }
# }

fn main() -> Result<(), BatchError> {
    let records = "1,alice,a@x.com
2,bob,b@x.com
3,carol,c@x.com";

    let reader = CsvItemReaderBuilder::new()
        .delimiter(b',')
        .field_names(&["userid", "username", "emailid"])
        .from_reader(records.as_bytes());

    let writer = LoggerWriter::default();

    let import = StepBuilder::new("import-users")
        .chunk::<User, User>(5) // commit interval
        .reader(&reader)
        .writer(&writer)
        .build();

    let first = Placeholder;
    let second = Placeholder;
    let tasklet_a = StepBuilder::new("tasklet-a").tasklet(&first).build();
    let tasklet_b = StepBuilder::new("tasklet-b").tasklet(&second).build();

    let executor = TaskExecutorBuilder::new()
        .core_pool_size(2)
        .max_pool_size(3)
        .build();

    let branch = FlowBuilder::new("tasklets")
        .start(&tasklet_a)
        .next(&tasklet_b)
        .build();

    let job = JobBuilder::new()
        .name("import-with-side-work")
        .start(&import)
        .split(&executor) // fork after the import step
        .add(branch)
        .build();

    let execution = job.run();

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.run_id, 1);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.

 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of item readers / writers (for example: csv reader, database writer)
pub mod item;
