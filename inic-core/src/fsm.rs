//! Table driven finite state machine.
//!
//! A machine is a `[state][event]` table of [`Transition`]s. Every pair has to
//! be spelled out; pairs that must not happen point to an action reporting the
//! problem and to a dedicated error state of the owning protocol. The engine
//! does no I/O and keeps no time, it is driven by its owner.

use core::fmt::{Debug, Display, Formatter};

/// Action of a transition. May return a follow-up event, which is processed
/// in the same [`Fsm::service`] call.
pub type Action<C, E> = fn(&mut C) -> Option<E>;

/// States and events are dense indices into the transition table.
pub trait FsmIndex: Copy + Debug {
    /// Row or column of this value in the table.
    fn index(self) -> usize;
}

/// One cell of a transition table.
#[derive(Debug)]
pub struct Transition<C, S, E> {
    /// Runs after the machine moved to `next`.
    pub action: Option<Action<C, E>>,
    /// State entered by this transition.
    pub next: S,
}

impl<C, S: Copy, E> Clone for Transition<C, S, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, S: Copy, E> Copy for Transition<C, S, E> {}

impl<C, S, E> Transition<C, S, E> {
    /// Moves to `next` without an action.
    pub const fn to(next: S) -> Self {
        Self { action: None, next }
    }

    /// Moves to `next` and runs `action`.
    pub const fn with(action: Action<C, E>, next: S) -> Self {
        Self {
            action: Some(action),
            next,
        }
    }
}

/// Transition table indexed by `[state][event]`.
pub type TransitionTable<C, S, E> = &'static [&'static [Transition<C, S, E>]];

/// Run status of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmStatus {
    /// No event is queued.
    Idle,
    /// The machine has been ended and ignores events.
    Ended,
    /// An event was outside the table.
    Error,
}

/// Invalid transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// A row of the table does not have one cell per event.
    Table,
    /// The initial state has no row.
    State,
}

impl Display for FsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Table => write!(f, "Transition table is not rectangular"),
            Self::State => write!(f, "Initial state is outside the transition table"),
        }
    }
}

/// A state machine instance.
pub struct Fsm<C, S, E>
where
    C: 'static,
    S: 'static,
    E: 'static,
{
    table: TransitionTable<C, S, E>,
    num_events: usize,
    state: S,
    event: Option<E>,
    status: FsmStatus,
}

impl<C: 'static, S: Debug + 'static, E: Debug + 'static> Debug for Fsm<C, S, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fsm")
            .field("state", &self.state)
            .field("event", &self.event)
            .field("status", &self.status)
            .finish()
    }
}

impl<C: 'static, S: FsmIndex + 'static, E: FsmIndex + 'static> Fsm<C, S, E> {
    /// Creates a machine in `initial` state.
    ///
    /// # Errors
    /// Returns an error if not every row of `table` has `num_events` cells or
    /// `initial` has no row.
    pub fn new(
        table: TransitionTable<C, S, E>,
        num_events: usize,
        initial: S,
    ) -> Result<Self, FsmError> {
        if table.iter().any(|row| row.len() != num_events) {
            return Err(FsmError::Table);
        }
        if initial.index() >= table.len() {
            return Err(FsmError::State);
        }
        Ok(Self {
            table,
            num_events,
            state: initial,
            event: None,
            status: FsmStatus::Idle,
        })
    }

    /// Current state.
    pub fn state(&self) -> S {
        self.state
    }

    /// Current run status.
    pub fn status(&self) -> FsmStatus {
        self.status
    }

    /// Queues `event`, replacing an event that was not serviced yet.
    pub fn set_event(&mut self, event: E) {
        if self.status != FsmStatus::Ended {
            self.event = Some(event);
        }
    }

    /// Whether an event is waiting for [`Fsm::service`].
    pub fn has_event(&self) -> bool {
        self.event.is_some()
    }

    /// Executes queued events until none is left.
    ///
    /// An [`FsmStatus::Error`] only describes the call that hit it.
    pub fn service(&mut self, owner: &mut C) -> FsmStatus {
        if self.status == FsmStatus::Error {
            self.status = FsmStatus::Idle;
        }
        while let Some(event) = self.event.take() {
            if self.status == FsmStatus::Ended {
                break;
            }
            let cell = self
                .table
                .get(self.state.index())
                .and_then(|row| row.get(event.index()))
                .filter(|_| event.index() < self.num_events);
            let Some(transition) = cell.copied() else {
                inic_warn!("Event {:?} outside table in state {:?}", event, self.state);
                self.status = FsmStatus::Error;
                return self.status;
            };
            inic_trace!(
                "FSM {:?} --{:?}--> {:?}",
                self.state,
                event,
                transition.next
            );
            self.state = transition.next;
            if let Some(action) = transition.action {
                self.event = action(owner);
            }
        }
        self.status
    }

    /// Terminates the machine. Queued and further events are dropped.
    pub fn end(&mut self) {
        self.event = None;
        self.status = FsmStatus::Ended;
    }
}
