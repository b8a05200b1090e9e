use crate::{config::MAX_SERVICES, list::DlList, list::NodeRef};

use core::{
    fmt::{Debug, Display, Formatter},
    time::Duration,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bitmask of pending service events.
pub type EventMask = u32;

/// Priority of a service. `0` is serviced first.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl Priority {
    /// The priority serviced first in every pass.
    pub const HIGHEST: Self = Self(0);
    /// The priority serviced last in every pass.
    pub const LOWEST: Self = Self(u8::MAX);
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(NodeRef);

#[derive(Debug, Clone)]
struct Service {
    priority: Priority,
    pending: EventMask,
}

/// Cooperative run-to-completion event scheduler.
///
/// Services are kept ordered by ascending priority value. Services with
/// equal priority are serviced in registration order. A pass visits every
/// service once; the pending events of a service are taken before its
/// callback runs, so raising an event of the running service from inside the
/// callback schedules it for the next pass.
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    services: DlList<Service, MAX_SERVICES>,
}

impl Scheduler {
    /// Creates a scheduler without services.
    pub fn new() -> Self {
        Self {
            services: DlList::new(),
        }
    }

    /// Registers a new service with `priority`.
    ///
    /// # Errors
    /// Returns an error if all service slots are in use.
    pub fn register(&mut self, priority: Priority) -> Result<ServiceId, ScheduleError> {
        let service = Service {
            priority,
            pending: 0,
        };
        let node = match self.services.find(|s| s.priority > priority) {
            Some(at) => self.services.insert_before(at, service),
            None => self.services.push_back(service),
        }
        .map_err(|_| ScheduleError::from(ScheduleErrorKind::Capacity))?;
        inic_trace!("Registered service {:?} with priority {}", node, priority);
        Ok(ServiceId(node))
    }

    /// Raises `events` for `service`.
    pub fn set_event(&mut self, service: ServiceId, events: EventMask) {
        if let Some(s) = self.services.get_mut(service.0) {
            s.pending |= events;
        }
    }

    /// Withdraws `events` from `service`.
    pub fn clear_event(&mut self, service: ServiceId, events: EventMask) {
        if let Some(s) = self.services.get_mut(service.0) {
            s.pending &= !events;
        }
    }

    /// Events currently pending for `service`.
    pub fn pending(&self, service: ServiceId) -> EventMask {
        self.services.get(service.0).map_or(0, |s| s.pending)
    }

    /// Whether any service has a pending event.
    pub fn has_pending(&self) -> bool {
        self.services.iter().any(|(_, s)| s.pending != 0)
    }

    /// Runs one pass over all services.
    ///
    /// `dispatch` is called once for every service with pending events, in
    /// priority order, with the events that were pending. Returns the number
    /// of dispatched services.
    pub fn run_once<F>(&mut self, mut dispatch: F) -> usize
    where
        F: FnMut(&mut Self, ServiceId, EventMask),
    {
        let mut dispatched = 0;
        let mut cursor = self.services.front();
        while let Some(node) = cursor {
            let events = self
                .services
                .get_mut(node)
                .map_or(0, |s| core::mem::take(&mut s.pending));
            if events != 0 {
                inic_trace!("Dispatching service {:?} with events {:#x}", node, events);
                dispatch(self, ServiceId(node), events);
                dispatched += 1;
            }
            cursor = self.services.next(node);
        }
        dispatched
    }
}

/// Source for the system time.
pub trait TimeSource {
    /// Gets the current system time.
    fn get_time(&self) -> Result<Duration, InvalidTimeError>;
}

/// The time returned by the system was invalid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidTimeError;

/// An error occured while registering or running services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleError {
    kind: ScheduleErrorKind,
}

/// Schedule error type.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ScheduleErrorKind {
    /// No free service or timer slot.
    Capacity,
    /// The system time was not normal.
    SystemTime(InvalidTimeError),
}

impl From<ScheduleErrorKind> for ScheduleError {
    fn from(kind: ScheduleErrorKind) -> Self {
        ScheduleError { kind }
    }
}

impl From<InvalidTimeError> for ScheduleError {
    fn from(value: InvalidTimeError) -> Self {
        ScheduleError {
            kind: ScheduleErrorKind::SystemTime(value),
        }
    }
}

impl ScheduleError {
    pub(crate) fn capacity() -> Self {
        ScheduleErrorKind::Capacity.into()
    }
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            ScheduleErrorKind::Capacity => write!(f, "No free service or timer slot"),
            ScheduleErrorKind::SystemTime(e) => write!(f, "The system time was invalid: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[test]
    fn services_run_in_priority_order() {
        let mut sched = Scheduler::new();
        let low = sched.register(Priority(200)).unwrap();
        let high = sched.register(Priority::HIGHEST).unwrap();
        let mid = sched.register(Priority(7)).unwrap();
        let mid2 = sched.register(Priority(7)).unwrap();
        for s in [low, high, mid, mid2] {
            sched.set_event(s, 1);
        }
        let mut order: Vec<ServiceId, 4> = Vec::new();
        assert_eq!(sched.run_once(|_, id, _| order.push(id).unwrap()), 4);
        assert_eq!(order.as_slice(), &[high, mid, mid2, low]);
        assert!(!sched.has_pending());
    }

    #[test]
    fn pending_events_are_taken_before_dispatch() {
        let mut sched = Scheduler::new();
        let s = sched.register(Priority(1)).unwrap();
        sched.set_event(s, 0b101);
        sched.clear_event(s, 0b100);
        let mut seen = 0;
        _ = sched.run_once(|sched, id, events| {
            seen = events;
            assert_eq!(sched.pending(id), 0);
        });
        assert_eq!(seen, 0b001);
    }

    #[test]
    fn rearming_self_runs_on_next_pass_only() {
        let mut sched = Scheduler::new();
        let s = sched.register(Priority(3)).unwrap();
        sched.set_event(s, 1);
        let mut runs = 0;
        let dispatched = sched.run_once(|sched, id, _| {
            runs += 1;
            sched.set_event(id, 1);
        });
        assert_eq!((dispatched, runs), (1, 1));
        assert_eq!(sched.pending(s), 1);
        _ = sched.run_once(|_, _, _| runs += 1);
        assert_eq!(runs, 2);
    }

    #[test]
    fn lower_priority_service_raised_during_pass_runs_in_same_pass() {
        let mut sched = Scheduler::new();
        let first = sched.register(Priority(1)).unwrap();
        let second = sched.register(Priority(2)).unwrap();
        sched.set_event(first, 1);
        let mut order: Vec<ServiceId, 4> = Vec::new();
        _ = sched.run_once(|sched, id, _| {
            order.push(id).unwrap();
            if id == first {
                sched.set_event(second, 2);
            }
        });
        assert_eq!(order.as_slice(), &[first, second]);
    }

    #[test]
    fn registration_fails_when_full() {
        let mut sched = Scheduler::new();
        for _ in 0..MAX_SERVICES {
            _ = sched.register(Priority(1)).unwrap();
        }
        assert_eq!(
            sched.register(Priority(1)),
            Err(ScheduleError::capacity())
        );
    }
}
