use std::fmt::Debug;

use log::info;

use crate::{core::item::ItemWriter, BatchError};

/// Writer that logs every item of the chunk at `info` level.
#[derive(Default)]
pub struct LoggerWriter {}

impl<O> ItemWriter<O> for LoggerWriter
where
    O: Debug + Send + Sync,
{
    fn write(&self, items: &[O]) -> Result<(), BatchError> {
        items.iter().for_each(|item| info!("Record:{:?}", item));
        Ok(())
    }
}
