use anyhow::{Result, bail};
use batch_flow_rs::{
    core::{
        executor::TaskExecutorBuilder,
        flow::FlowBuilder,
        job::{BatchStatus, Job, JobBuilder},
        step::{RepeatStatus, StepBuilder, StepExecution, Tasklet},
    },
    error::BatchError,
    item::{csv::csv_reader::CsvItemReaderBuilder, logger::LoggerWriter},
};
use log::info;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
struct User {
    userid: i32,
    username: String,
    emailid: String,
}

struct LogTasklet {
    message: &'static str,
}

impl Tasklet for LogTasklet {
    fn execute(&self, _execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
        info!("{}", self.message);
        Ok(RepeatStatus::Finished)
    }
}

/// Database-free variant of the parallel import job: the sink is a logger.
fn main() -> Result<()> {
    env_logger::init();

    let records = "1,alice,a@x.com
2,bob,b@x.com
3,carol,c@x.com
4,dave,d@x.com
5,eve,e@x.com
6,frank,f@x.com";

    let reader = CsvItemReaderBuilder::new()
        .delimiter(b',')
        .field_names(&["userid", "username", "emailid"])
        .from_reader(records.as_bytes());

    let writer = LoggerWriter::default();

    let import = StepBuilder::new("log-users")
        .chunk::<User, User>(5)
        .reader(&reader)
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
        .name("log-users")
        .start(&import)
        .split(&executor)
        .add(side_work)
        .build();

    let execution = job.run();

    if execution.status != BatchStatus::Completed {
        bail!("job failed");
    }

    Ok(())
}
