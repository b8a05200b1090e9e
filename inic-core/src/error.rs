//! Error types

use core::fmt::{Display, Formatter};

use crate::{
    config::StackConfigError, endpoint::EndpointError, fsm::FsmError, manager::XrmError,
    resource::CatalogError, scheduler::ScheduleError, subject::SubjectError,
};

/// General error type for this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid stack configuration.
    Configuration(StackConfigError),

    /// Invalid resource catalog.
    Catalog(CatalogError),

    /// Error while accessing the scheduler or timers.
    Schedule(ScheduleError),

    /// An observer could not be registered.
    Subject(SubjectError),

    /// Invalid state machine table.
    Fsm(FsmError),

    /// A resource manager refused a request.
    Job(XrmError),

    /// An endpoint refused a request.
    Endpoint(EndpointError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "Invalid configuration: {e}"),
            Error::Catalog(e) => write!(f, "Invalid resource catalog: {e}"),
            Error::Schedule(e) => write!(f, "Error while accessing the scheduler: {e}"),
            Error::Subject(e) => write!(f, "Failed to register observer: {e}"),
            Error::Fsm(e) => write!(f, "Invalid state machine: {e}"),
            Error::Job(e) => write!(f, "Job request refused: {e}"),
            Error::Endpoint(e) => write!(f, "Endpoint request refused: {e}"),
        }
    }
}

impl From<StackConfigError> for Error {
    fn from(value: StackConfigError) -> Self {
        Error::Configuration(value)
    }
}

impl From<CatalogError> for Error {
    fn from(value: CatalogError) -> Self {
        Error::Catalog(value)
    }
}

impl From<ScheduleError> for Error {
    fn from(value: ScheduleError) -> Self {
        Error::Schedule(value)
    }
}

impl From<SubjectError> for Error {
    fn from(value: SubjectError) -> Self {
        Error::Subject(value)
    }
}

impl From<FsmError> for Error {
    fn from(value: FsmError) -> Self {
        Error::Fsm(value)
    }
}

impl From<XrmError> for Error {
    fn from(value: XrmError) -> Self {
        Error::Job(value)
    }
}

impl From<EndpointError> for Error {
    fn from(value: EndpointError) -> Self {
        Error::Endpoint(value)
    }
}
