//! Software timers raising scheduler events.

use crate::{
    config::MAX_TIMERS,
    scheduler::{EventMask, ScheduleError, Scheduler, ServiceId},
};

use core::time::Duration;
use heapless::Vec;

/// Handle of an allocated timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u8);

/// A timer bound to the events of one service.
#[derive(Debug, Clone, Copy)]
struct Timer {
    service: ServiceId,
    events: EventMask,
    /// Instant at which the timer fires next, if armed.
    due: Option<Duration>,
    /// Re-arm interval of a periodic timer.
    period: Option<Duration>,
}

impl Timer {
    fn is_due(&self, now: &Duration) -> bool {
        self.due.is_some_and(|due| due <= *now)
    }
}

/// Fixed set of software timers.
#[derive(Debug, Default, Clone)]
pub struct Timers {
    timers: Vec<Timer, MAX_TIMERS>,
}

impl Timers {
    /// Creates an empty timer set.
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Allocates a stopped timer that raises `events` for `service`.
    ///
    /// # Errors
    /// Returns an error if all timer slots are in use.
    pub fn create(
        &mut self,
        service: ServiceId,
        events: EventMask,
    ) -> Result<TimerId, ScheduleError> {
        let id = TimerId(self.timers.len() as u8);
        self.timers
            .push(Timer {
                service,
                events,
                due: None,
                period: None,
            })
            .map_err(|_| ScheduleError::capacity())?;
        Ok(id)
    }

    /// Arms `timer` to fire `delay` after `now`, and then every `period` if
    /// one is given. Restarts the timer if it was already running.
    pub fn start(
        &mut self,
        timer: TimerId,
        now: Duration,
        delay: Duration,
        period: Option<Duration>,
    ) {
        if let Some(t) = self.timers.get_mut(timer.0 as usize) {
            t.due = Some(now.saturating_add(delay));
            t.period = period;
        }
    }

    /// Disarms `timer`.
    pub fn stop(&mut self, timer: TimerId) {
        if let Some(t) = self.timers.get_mut(timer.0 as usize) {
            t.due = None;
        }
    }

    /// Whether `timer` is armed.
    pub fn is_running(&self, timer: TimerId) -> bool {
        self.timers
            .get(timer.0 as usize)
            .is_some_and(|t| t.due.is_some())
    }

    /// Earliest instant at which any timer fires.
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.iter().filter_map(|t| t.due).min()
    }

    /// Raises the events of every timer that is due at `now`. One-shot
    /// timers are disarmed, periodic timers are re-armed relative to `now`.
    /// Returns the number of fired timers.
    pub fn poll(&mut self, now: Duration, scheduler: &mut Scheduler) -> usize {
        let mut fired = 0;
        for t in self.timers.iter_mut().filter(|t| t.is_due(&now)) {
            scheduler.set_event(t.service, t.events);
            t.due = t.period.map(|p| now.saturating_add(p));
            fired += 1;
        }
        if fired > 0 {
            inic_trace!("{} timer(s) fired at {:?}", fired, now);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Priority;

    #[test]
    fn one_shot_timer_raises_event_once() {
        let mut sched = Scheduler::new();
        let svc = sched.register(Priority(1)).unwrap();
        let mut timers = Timers::new();
        let t = timers.create(svc, 0x4).unwrap();
        timers.start(t, Duration::from_millis(10), Duration::from_millis(5), None);
        assert_eq!(timers.next_due(), Some(Duration::from_millis(15)));
        assert_eq!(timers.poll(Duration::from_millis(14), &mut sched), 0);
        assert_eq!(timers.poll(Duration::from_millis(15), &mut sched), 1);
        assert_eq!(sched.pending(svc), 0x4);
        assert!(!timers.is_running(t));
        assert_eq!(timers.poll(Duration::from_millis(100), &mut sched), 0);
    }

    #[test]
    fn periodic_timer_rearms_and_stop_disarms() {
        let mut sched = Scheduler::new();
        let svc = sched.register(Priority(1)).unwrap();
        let mut timers = Timers::new();
        let t = timers.create(svc, 1).unwrap();
        let period = Duration::from_millis(10);
        timers.start(t, Duration::ZERO, period, Some(period));
        assert_eq!(timers.poll(Duration::from_millis(10), &mut sched), 1);
        assert!(timers.is_running(t));
        assert_eq!(timers.next_due(), Some(Duration::from_millis(20)));
        timers.stop(t);
        assert_eq!(timers.poll(Duration::from_millis(30), &mut sched), 0);
    }
}
