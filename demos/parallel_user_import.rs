use std::env;

use anyhow::{Context, Result, bail};
use batch_flow_rs::{
    core::{
        executor::TaskExecutorBuilder,
        flow::FlowBuilder,
        item::{ItemProcessor, ItemProcessorResult},
        job::{BatchStatus, Job, JobBuilder},
        step::{RepeatStatus, StepBuilder, StepExecution, Tasklet},
    },
    error::BatchError,
    item::csv::csv_reader::CsvItemReaderBuilder,
    item::rdbc::{RdbcItemBinder, RdbcItemWriterBuilder},
};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::{Any, AnyPool, query_builder::Separated};

#[derive(Deserialize, Serialize, Debug, Clone)]
struct User {
    userid: i32,
    username: String,
    emailid: String,
}

struct UserItemBinder;

impl RdbcItemBinder<User> for UserItemBinder {
    fn bind(&self, item: &User, mut query_builder: Separated<Any, &str>) {
        query_builder.push_bind(item.userid);
        query_builder.push_bind(item.username.clone());
        query_builder.push_bind(item.emailid.clone());
    }
}

/// Identity processor that logs each user flowing through the pipeline.
#[derive(Default)]
struct LogUserProcessor {}

impl ItemProcessor<User, User> for LogUserProcessor {
    fn process(&self, item: &User) -> ItemProcessorResult<User> {
        info!("Processing item: {}", item.userid);
        Ok(item.clone())
    }
}

/// Placeholder side work running concurrently with the main sequence.
struct LogTasklet {
    message: &'static str,
}

impl Tasklet for LogTasklet {
    fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
        info!("{}", self.message);
        Ok(RepeatStatus::Finished)
    }
}

/// Four-step job over a delimited user file:
///
/// `import-users (chunk=5) -> [split: tasklet-a -> tasklet-b] -> reimport-users (chunk=10)`
///
/// The database connection string comes from `DATABASE_URL`; credentials
/// never live in the source tree.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let connection_uri =
        env::var("DATABASE_URL").context("DATABASE_URL must point at the target database")?;
    sqlx::any::install_default_drivers();
    let pool = AnyPool::connect(&connection_uri).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_batch (userid INT, username VARCHAR(255), emailid VARCHAR(255))",
    )
    .execute(&pool)
    .await?;

    let input_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/data/users.txt".to_string());

    // One reader per chunk step: the file position is never shared.
    let first_reader = CsvItemReaderBuilder::new()
        .delimiter(b',')
        .field_names(&["userid", "username", "emailid"])
        .from_path(&input_path);

    let second_reader = CsvItemReaderBuilder::new()
        .delimiter(b',')
        .field_names(&["userid", "username", "emailid"])
        .from_path(&input_path);

    let item_binder = UserItemBinder;

    let writer = RdbcItemWriterBuilder::new()
        .table("user_batch")
        .add_column("userid")
        .add_column("username")
        .add_column("emailid")
        .pool(&pool)
        .item_binder(&item_binder)
        .build();

    let processor = LogUserProcessor::default();

    let import = StepBuilder::new("import-users")
        .chunk::<User, User>(5)
        .reader(&first_reader)
        .processor(&processor)
        .writer(&writer)
        .build();

    let reimport = StepBuilder::new("reimport-users")
        .chunk::<User, User>(10)
        .reader(&second_reader)
        .processor(&processor)
        .writer(&writer)
        .build();

    let first_marker = LogTasklet {
        message: "side work: first tasklet",
    };
    let second_marker = LogTasklet {
        message: "side work: second tasklet",
    };
    let tasklet_a = StepBuilder::new("tasklet-a").tasklet(&first_marker).build();
    let tasklet_b = StepBuilder::new("tasklet-b").tasklet(&second_marker).build();

    let executor = TaskExecutorBuilder::new()
        .core_pool_size(2)
        .max_pool_size(3)
        .thread_name_prefix("job-thread")
        .build();

    let side_work = FlowBuilder::new("side-work")
        .start(&tasklet_a)
        .next(&tasklet_b)
        .build();

    let job = JobBuilder::new()
        .name("parallel-user-import")
        .start(&import)
        .split(&executor)
        .add(side_work)
        .next(&reimport)
        .build();

    let execution = job.run();

    info!(
        "run {} finished with status {:?} in {:?}",
        execution.run_id, execution.status, execution.duration
    );

    if execution.status != BatchStatus::Completed {
        let failure = execution
            .failure
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        bail!("job failed: {}", failure);
    }

    Ok(())
}
