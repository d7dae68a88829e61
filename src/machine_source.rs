//! MachineQuerySource: the collector-protocol adapter used only for the
//! change-detection helper on `ResourcePool`.

use async_trait::async_trait;

use crate::error::SchedulerError;
use crate::pool::MachineRecord;

#[async_trait]
pub trait MachineQuerySource: Send + Sync {
    async fn query(&self) -> Result<Vec<MachineRecord>, SchedulerError>;
}
