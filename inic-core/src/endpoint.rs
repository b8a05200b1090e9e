//! Endpoints: one side of a network connection built from a resource list.
//!
//! The lifecycle of an endpoint is a table driven [`Fsm`]. A source endpoint
//! may be built by several users and is only destroyed when the last user
//! releases it; a sink endpoint has exactly one user. A failed destroy
//! leaves the endpoint built with its users, so it can be destroyed again.

use crate::{
    fsm::{Fsm, FsmError, FsmIndex, Transition, TransitionTable},
    manager::XrmError,
    report::{JobReport, ResultCode, UserArg},
    resource::{ConnectionLabel, ListId, NodeAddress},
};
use core::fmt::{Debug, Display, Formatter};

/// Build and destroy requests of an endpoint.
pub trait JobControl {
    /// Starts building `list` on `node`.
    fn process(
        &mut self,
        node: NodeAddress,
        list: ListId,
        label: ConnectionLabel,
        user_arg: UserArg,
    ) -> Result<(), XrmError>;

    /// Starts destroying `list` on `node`.
    fn destroy(&mut self, node: NodeAddress, list: ListId) -> Result<(), XrmError>;
}

/// Side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Feeds data into the network, may be shared.
    Source,
    /// Takes data from the network.
    Sink,
}

/// Lifecycle state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Not built.
    Idle,
    /// A build or destroy runs.
    Processing,
    /// Built.
    Built,
    /// An event arrived that the lifecycle does not allow.
    Error,
}

impl FsmIndex for EndpointState {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointEvent {
    BuildRequested,
    DestroyRequested,
    BuildDone,
    DestroyDone,
    Failed,
    DestroyFailed,
}

impl FsmIndex for EndpointEvent {
    fn index(self) -> usize {
        self as usize
    }
}

const NUM_EVENTS: usize = 6;

#[derive(Debug, Default)]
struct Usage {
    users: u8,
    violations: u8,
}

fn first_user(u: &mut Usage) -> Option<EndpointEvent> {
    u.users = 1;
    None
}

fn another_user(u: &mut Usage) -> Option<EndpointEvent> {
    u.users = u.users.saturating_add(1);
    None
}

fn no_user(u: &mut Usage) -> Option<EndpointEvent> {
    u.users = 0;
    None
}

fn violation(u: &mut Usage) -> Option<EndpointEvent> {
    u.violations = u.violations.saturating_add(1);
    inic_warn!("Endpoint event not allowed in current state");
    None
}

type T = Transition<Usage, EndpointState, EndpointEvent>;

#[rustfmt::skip]
const LIFECYCLE: TransitionTable<Usage, EndpointState, EndpointEvent> = &[
    // Idle
    &[
        T::to(EndpointState::Processing),
        T::with(violation, EndpointState::Error),
        T::with(violation, EndpointState::Error),
        T::with(no_user, EndpointState::Idle),
        T::with(no_user, EndpointState::Idle),
        T::with(no_user, EndpointState::Idle),
    ],
    // Processing
    &[
        T::with(violation, EndpointState::Error),
        T::with(violation, EndpointState::Error),
        T::with(first_user, EndpointState::Built),
        T::with(no_user, EndpointState::Idle),
        T::with(no_user, EndpointState::Idle),
        T::to(EndpointState::Built),
    ],
    // Built
    &[
        T::with(another_user, EndpointState::Built),
        T::to(EndpointState::Processing),
        T::with(violation, EndpointState::Error),
        T::with(no_user, EndpointState::Idle),
        T::with(violation, EndpointState::Error),
        T::to(EndpointState::Built),
    ],
    // Error
    &[
        T::to(EndpointState::Error),
        T::to(EndpointState::Error),
        T::to(EndpointState::Error),
        T::to(EndpointState::Error),
        T::to(EndpointState::Error),
        T::to(EndpointState::Error),
    ],
];

/// A request to an endpoint was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    /// A sink endpoint is already built.
    AlreadyBuilt,
    /// The endpoint is not built.
    AlreadyDestroyed,
    /// A build or destroy runs.
    Busy,
    /// The endpoint is in its error state.
    Failed,
    /// The resource manager refused the request.
    Job(XrmError),
}

impl From<XrmError> for EndpointError {
    fn from(value: XrmError) -> Self {
        EndpointError::Job(value)
    }
}

impl Display for EndpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyBuilt => write!(f, "Endpoint is already built"),
            Self::AlreadyDestroyed => write!(f, "Endpoint is not built"),
            Self::Busy => write!(f, "Endpoint operation in progress"),
            Self::Failed => write!(f, "Endpoint is in error state"),
            Self::Job(e) => write!(f, "Request refused: {e}"),
        }
    }
}

/// An endpoint bound to one resource list of one device.
pub struct Endpoint {
    kind: EndpointKind,
    node: NodeAddress,
    list: ListId,
    fsm: Fsm<Usage, EndpointState, EndpointEvent>,
    usage: Usage,
    last: Option<ResultCode>,
}

impl Debug for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("list", &self.list)
            .field("fsm", &self.fsm)
            .field("users", &self.usage.users)
            .field("last", &self.last)
            .finish()
    }
}

impl Endpoint {
    /// Creates an idle endpoint for `list` on `node`.
    ///
    /// # Errors
    /// Returns an error if the lifecycle table is malformed.
    pub fn new(kind: EndpointKind, node: NodeAddress, list: ListId) -> Result<Self, FsmError> {
        Ok(Self {
            kind,
            node,
            list,
            fsm: Fsm::new(LIFECYCLE, NUM_EVENTS, EndpointState::Idle)?,
            usage: Usage::default(),
            last: None,
        })
    }

    /// Kind of the endpoint.
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EndpointState {
        self.fsm.state()
    }

    /// Number of users of a built endpoint.
    pub fn users(&self) -> u8 {
        self.usage.users
    }

    /// Code of the last report received.
    pub fn last_result(&self) -> Option<ResultCode> {
        self.last
    }

    /// Number of events that arrived in a state not allowing them.
    pub fn violations(&self) -> u8 {
        self.usage.violations
    }

    fn raise(&mut self, event: EndpointEvent) {
        self.fsm.set_event(event);
        _ = self.fsm.service(&mut self.usage);
    }

    /// Builds the endpoint. Building a built source endpoint adds a user.
    ///
    /// # Errors
    /// Returns an error if the endpoint is busy, failed, is a built sink, or
    /// the resource manager refuses the request.
    pub fn build<J: JobControl + ?Sized>(
        &mut self,
        jobs: &mut J,
        label: ConnectionLabel,
        user_arg: UserArg,
    ) -> Result<(), EndpointError> {
        match self.state() {
            EndpointState::Idle => {
                jobs.process(self.node, self.list, label, user_arg)?;
            }
            EndpointState::Built if self.kind == EndpointKind::Source => {}
            EndpointState::Built => return Err(EndpointError::AlreadyBuilt),
            EndpointState::Processing => return Err(EndpointError::Busy),
            EndpointState::Error => return Err(EndpointError::Failed),
        }
        self.raise(EndpointEvent::BuildRequested);
        Ok(())
    }

    /// Releases one user. The resources are destroyed when the last user is
    /// gone.
    ///
    /// # Errors
    /// Returns an error if the endpoint is not built, busy, failed, or the
    /// resource manager refuses the request.
    pub fn destroy<J: JobControl + ?Sized>(&mut self, jobs: &mut J) -> Result<(), EndpointError> {
        match self.state() {
            EndpointState::Built if self.usage.users > 1 => {
                self.usage.users -= 1;
                return Ok(());
            }
            EndpointState::Built => {
                jobs.destroy(self.node, self.list)?;
            }
            EndpointState::Idle => return Err(EndpointError::AlreadyDestroyed),
            EndpointState::Processing => return Err(EndpointError::Busy),
            EndpointState::Error => return Err(EndpointError::Failed),
        }
        self.raise(EndpointEvent::DestroyRequested);
        Ok(())
    }

    /// Feeds a job report to the endpoint. Returns whether the report was
    /// about this endpoint.
    pub fn on_report(&mut self, report: &JobReport) -> bool {
        if report.node != self.node || report.list != self.list {
            return false;
        }
        self.last = Some(report.result.code);
        let event = match report.result.code {
            ResultCode::BuildSuccess => EndpointEvent::BuildDone,
            ResultCode::DestroySuccess | ResultCode::AutoDestroyed => EndpointEvent::DestroyDone,
            ResultCode::DestroyError => EndpointEvent::DestroyFailed,
            ResultCode::BuildError
            | ResultCode::SyncError
            | ResultCode::ConfigError
            | ResultCode::InvalidListError => EndpointEvent::Failed,
        };
        self.raise(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::JobResult;
    use heapless::Vec;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Call {
        Process(ListId),
        Destroy(ListId),
    }

    #[derive(Default)]
    struct Jobs {
        calls: Vec<Call, 8>,
        refuse: Option<XrmError>,
    }

    impl JobControl for Jobs {
        fn process(
            &mut self,
            _: NodeAddress,
            list: ListId,
            _: ConnectionLabel,
            _: UserArg,
        ) -> Result<(), XrmError> {
            self.refuse.map_or(Ok(()), Err)?;
            _ = self.calls.push(Call::Process(list));
            Ok(())
        }

        fn destroy(&mut self, _: NodeAddress, list: ListId) -> Result<(), XrmError> {
            self.refuse.map_or(Ok(()), Err)?;
            _ = self.calls.push(Call::Destroy(list));
            Ok(())
        }
    }

    fn report(code: ResultCode) -> JobReport {
        JobReport {
            node: NodeAddress(1),
            list: ListId(2),
            connection_label: ConnectionLabel(0),
            result: JobResult::new(code),
            user_arg: 0,
        }
    }

    fn endpoint(kind: EndpointKind) -> Endpoint {
        Endpoint::new(kind, NodeAddress(1), ListId(2)).unwrap()
    }

    #[test]
    fn source_is_shared_and_destroyed_by_last_user() {
        let mut jobs = Jobs::default();
        let mut ep = endpoint(EndpointKind::Source);
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        assert_eq!(ep.state(), EndpointState::Processing);
        assert!(ep.on_report(&report(ResultCode::BuildSuccess)));
        assert_eq!((ep.state(), ep.users()), (EndpointState::Built, 1));
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        assert_eq!(ep.users(), 2);
        ep.destroy(&mut jobs).unwrap();
        assert_eq!((ep.state(), ep.users()), (EndpointState::Built, 1));
        ep.destroy(&mut jobs).unwrap();
        assert_eq!(ep.state(), EndpointState::Processing);
        assert!(ep.on_report(&report(ResultCode::DestroySuccess)));
        assert_eq!((ep.state(), ep.users()), (EndpointState::Idle, 0));
        assert_eq!(
            jobs.calls.as_slice(),
            &[Call::Process(ListId(2)), Call::Destroy(ListId(2))]
        );
    }

    #[test]
    fn sink_has_a_single_user() {
        let mut jobs = Jobs::default();
        let mut ep = endpoint(EndpointKind::Sink);
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        assert_eq!(ep.build(&mut jobs, ConnectionLabel(0), 0), Err(EndpointError::Busy));
        _ = ep.on_report(&report(ResultCode::BuildSuccess));
        assert_eq!(
            ep.build(&mut jobs, ConnectionLabel(0), 0),
            Err(EndpointError::AlreadyBuilt)
        );
    }

    #[test]
    fn failure_returns_to_idle_with_code() {
        let mut jobs = Jobs::default();
        let mut ep = endpoint(EndpointKind::Sink);
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        _ = ep.on_report(&report(ResultCode::SyncError));
        assert_eq!(ep.state(), EndpointState::Idle);
        assert_eq!(ep.last_result(), Some(ResultCode::SyncError));
        assert_eq!(ep.destroy(&mut jobs), Err(EndpointError::AlreadyDestroyed));
    }

    #[test]
    fn failed_destroy_can_be_retried() {
        let mut jobs = Jobs::default();
        let mut ep = endpoint(EndpointKind::Source);
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        _ = ep.on_report(&report(ResultCode::BuildSuccess));
        ep.destroy(&mut jobs).unwrap();
        _ = ep.on_report(&report(ResultCode::DestroyError));
        assert_eq!((ep.state(), ep.users()), (EndpointState::Built, 1));
        assert_eq!(ep.last_result(), Some(ResultCode::DestroyError));

        ep.destroy(&mut jobs).unwrap();
        assert_eq!(ep.state(), EndpointState::Processing);
        _ = ep.on_report(&report(ResultCode::DestroySuccess));
        assert_eq!((ep.state(), ep.users()), (EndpointState::Idle, 0));
        assert_eq!(
            jobs.calls.as_slice(),
            &[
                Call::Process(ListId(2)),
                Call::Destroy(ListId(2)),
                Call::Destroy(ListId(2))
            ]
        );
        assert_eq!(ep.violations(), 0);
    }

    #[test]
    fn auto_destroy_of_built_endpoint_returns_to_idle() {
        let mut jobs = Jobs::default();
        let mut ep = endpoint(EndpointKind::Source);
        ep.build(&mut jobs, ConnectionLabel(0), 0).unwrap();
        _ = ep.on_report(&report(ResultCode::BuildSuccess));
        _ = ep.on_report(&report(ResultCode::AutoDestroyed));
        assert_eq!((ep.state(), ep.users()), (EndpointState::Idle, 0));
    }

    #[test]
    fn refused_request_leaves_state_unchanged() {
        let mut jobs = Jobs {
            refuse: Some(XrmError::ApiLocked),
            ..Default::default()
        };
        let mut ep = endpoint(EndpointKind::Sink);
        assert_eq!(
            ep.build(&mut jobs, ConnectionLabel(0), 0),
            Err(EndpointError::Job(XrmError::ApiLocked))
        );
        assert_eq!(ep.state(), EndpointState::Idle);
    }

    #[test]
    fn unexpected_report_enters_error_state() {
        let mut ep = endpoint(EndpointKind::Sink);
        _ = ep.on_report(&report(ResultCode::BuildSuccess));
        assert_eq!(ep.state(), EndpointState::Error);
        assert_eq!(ep.violations(), 1);
        let mut other = report(ResultCode::BuildSuccess);
        other.list = ListId(9);
        assert!(!ep.on_report(&other));
    }
}
