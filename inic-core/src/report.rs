//! Job outcome reports.

use crate::{
    inic::{CommandError, DeviceError},
    resource::{ConnectionLabel, ListId, NodeAddress, ResourceId, ResourceType},
};
use core::fmt::{Display, Formatter};

/// Opaque value passed through from a request to its reports.
pub type UserArg = u32;

/// Outcome of a job operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Every resource of the list exists.
    BuildSuccess,
    /// Every resource of the list that was not shared is gone.
    DestroySuccess,
    /// A create command failed.
    BuildError,
    /// A destroy command failed. The job keeps the handles not yet released.
    DestroyError,
    /// The remote controller could not be attached.
    SyncError,
    /// The catalog or the handle table could not serve the list.
    ConfigError,
    /// The list refers to a descriptor that does not exist.
    InvalidListError,
    /// The resources of the job disappeared without being destroyed.
    AutoDestroyed,
}

impl ResultCode {
    /// Whether the code reports a success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::BuildSuccess | Self::DestroySuccess)
    }
}

/// Where and why a job operation failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResultDetails {
    /// Kind of the resource being worked on
    pub resource_type: Option<ResourceType>,
    /// Position of that resource in the list
    pub resource_index: Option<usize>,
    /// The command could not be queued.
    pub transmission: Option<CommandError>,
    /// The device answered with an error.
    pub target: Option<DeviceError>,
}

/// Outcome with details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    /// Outcome
    pub code: ResultCode,
    /// Details of a failure
    pub details: ResultDetails,
}

impl JobResult {
    pub(crate) fn new(code: ResultCode) -> Self {
        Self {
            code,
            details: ResultDetails::default(),
        }
    }
}

impl From<ResultCode> for JobResult {
    fn from(code: ResultCode) -> Self {
        Self::new(code)
    }
}

impl Display for JobResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.code)?;
        if let Some(t) = self.details.resource_type {
            write!(f, " at {t:?}")?;
        }
        if let Some(i) = self.details.resource_index {
            write!(f, " (#{i})")?;
        }
        if let Some(e) = self.details.transmission {
            write!(f, ": {e}")?;
        }
        if let Some(e) = self.details.target {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

/// Final report of a job operation. Exactly one is emitted per accepted
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    /// Device
    pub node: NodeAddress,
    /// Job
    pub list: ListId,
    /// Connection label of the job
    pub connection_label: ConnectionLabel,
    /// Outcome
    pub result: JobResult,
    /// Value given with the request
    pub user_arg: UserArg,
}

/// Step of a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    /// The resource was created.
    Built,
    /// The resource was released.
    Destroyed,
    /// Creating the resource failed.
    BuildFailed,
}

/// Debug notice about a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDebug {
    /// Device
    pub node: NodeAddress,
    /// Descriptor
    pub resource: ResourceId,
    /// Kind of the descriptor
    pub resource_type: ResourceType,
    /// What happened
    pub event: ResourceEvent,
    /// Job
    pub list: ListId,
    /// Value given with the request
    pub user_arg: UserArg,
}

/// Receiver of job reports.
pub trait ReportSink {
    /// Receives the final report of a job operation.
    fn report(&mut self, report: &JobReport);

    /// Receives a per-resource notice. Ignored by default.
    fn resource_debug(&mut self, _notice: &ResourceDebug) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_codes_are_successful() {
        assert!(ResultCode::BuildSuccess.is_success());
        assert!(ResultCode::DestroySuccess.is_success());
        assert!(!ResultCode::AutoDestroyed.is_success());
        assert!(!ResultCode::ConfigError.is_success());
    }
}
