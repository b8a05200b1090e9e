use crate::{
    config::{StackConfig, MAX_DEVICES},
    endpoint::JobControl,
    error::Error,
    inic::*,
    manager::{ResourceManager, XrmContext, XrmError},
    report::{ReportSink, UserArg},
    resource::{ConnectionLabel, ListId, NodeAddress, ResourceLists},
    scheduler::{ScheduleError, Scheduler, TimeSource},
    timer::Timers,
};
use core::time::Duration;
use heapless::Vec;

/// The control plane of all configured devices.
///
/// Owns the scheduler, the timers, the result subjects and one
/// [`ResourceManager`] per device. Requests are accepted immediately; the
/// work happens in [`Runtime::run_once`], and answers of the devices are
/// passed back through the `complete_*` methods.
#[derive(Debug)]
pub struct Runtime<'a, C, R, const JOBS: usize, const HANDLES: usize>
where
    C: Controller,
    R: ReportSink,
{
    scheduler: Scheduler,
    timers: Timers,
    channels: CommandChannels,
    managers: Vec<ResourceManager<'a, JOBS, HANDLES>, MAX_DEVICES>,
    controller: C,
    sink: R,
    now: Duration,
}

impl<'a, C, R, const JOBS: usize, const HANDLES: usize> Runtime<'a, C, R, JOBS, HANDLES>
where
    C: Controller,
    R: ReportSink,
{
    /// Creates a runtime for the devices of `cfg`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or exceeds the
    /// capacity of the scheduler or timers.
    pub fn new(
        cfg: &StackConfig,
        catalog: &'a dyn ResourceLists,
        controller: C,
        sink: R,
    ) -> Result<Self, Error> {
        cfg.validate()?;
        let mut scheduler = Scheduler::new();
        let mut timers = Timers::new();
        let mut channels = CommandChannels::new();
        let mut managers: Vec<_, MAX_DEVICES> = Vec::new();
        for node in cfg.devices.iter() {
            let waiter = channels
                .add_device(*node)
                .map_err(|_| ScheduleError::capacity())?;
            let xrm =
                ResourceManager::new(*node, waiter, catalog, cfg, &mut scheduler, &mut timers)?;
            _ = channels.notices().add_observer(waiter, NOTICE_ALL)?;
            managers
                .push(xrm)
                .map_err(|_| ScheduleError::capacity())?;
        }
        inic_debug!("Runtime serving {} device(s)", managers.len());
        Ok(Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now: Duration::ZERO,
        })
    }

    /// Manager of `node`.
    pub fn manager(&self, node: NodeAddress) -> Option<&ResourceManager<'a, JOBS, HANDLES>> {
        self.managers.iter().find(|m| m.node() == node)
    }

    /// Starts building `list` on `node`.
    ///
    /// # Errors
    /// Returns an error if no manager serves `node` or the manager refuses.
    pub fn process(
        &mut self,
        node: NodeAddress,
        list: ListId,
        label: ConnectionLabel,
        user_arg: UserArg,
    ) -> Result<(), XrmError> {
        let Self {
            managers,
            scheduler,
            ..
        } = self;
        managers
            .iter_mut()
            .find(|m| m.node() == node)
            .ok_or(XrmError::UnknownDevice)?
            .process(list, label, user_arg, scheduler)
    }

    /// Starts destroying `list` on `node`.
    ///
    /// # Errors
    /// Returns an error if no manager serves `node` or the manager refuses.
    pub fn destroy(&mut self, node: NodeAddress, list: ListId) -> Result<(), XrmError> {
        let Self {
            managers,
            scheduler,
            ..
        } = self;
        managers
            .iter_mut()
            .find(|m| m.node() == node)
            .ok_or(XrmError::UnknownDevice)?
            .destroy(list, scheduler)
    }

    /// Fires due timers and runs one scheduler pass at time `now`. Returns
    /// the number of serviced managers.
    pub fn run_once(&mut self, now: Duration) -> usize {
        let Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now: current,
        } = self;
        *current = now;
        _ = timers.poll(now, scheduler);
        scheduler.run_once(|scheduler, service, events| {
            let Some(xrm) = managers.iter_mut().find(|m| m.service_id() == service) else {
                return;
            };
            let mut ctx = XrmContext {
                scheduler,
                timers: &mut *timers,
                channels: &*channels,
                controller: &mut *controller,
                sink: &mut *sink,
                now,
            };
            xrm.service(events, &mut ctx);
        })
    }

    /// Runs scheduler passes at time `now` until no event is pending, at most
    /// `max_passes` times. Returns the number of passes.
    pub fn run_until_idle(&mut self, now: Duration, max_passes: usize) -> usize {
        let mut passes = 0;
        while passes < max_passes {
            _ = self.run_once(now);
            passes += 1;
            if !self.scheduler.has_pending() {
                break;
            }
        }
        passes
    }

    /// Runs one pass at the time of `time`.
    ///
    /// # Errors
    /// Returns an error if the time source fails.
    pub fn run<T: TimeSource + ?Sized>(&mut self, time: &T) -> Result<usize, Error> {
        let now = time.get_time().map_err(ScheduleError::from)?;
        Ok(self.run_once(now))
    }

    /// Earliest instant at which a command times out.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.timers.next_due()
    }

    /// Whether any manager has work queued.
    pub fn has_pending(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Delivers the answer of `node` to a create command.
    pub fn complete_create(&mut self, node: NodeAddress, result: CreateResult) {
        let Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now,
        } = self;
        let Some(channel) = channels.device_by_node(node) else {
            inic_warn!("Create result from unknown device {}", node);
            return;
        };
        let mut ctx = XrmContext {
            scheduler,
            timers,
            channels: &*channels,
            controller,
            sink,
            now: *now,
        };
        let delivered = channel.create.notify(&result, true, |w, r| {
            if let Some(xrm) = managers.get_mut(w.0 as usize) {
                xrm.on_create_result(r, &mut ctx);
            }
        });
        if !delivered {
            inic_warn!("Nobody waits for create result of {}", node);
        }
    }

    /// Delivers the answer of `node` to a destroy command.
    pub fn complete_destroy(&mut self, node: NodeAddress, result: DestroyResult) {
        let Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now,
        } = self;
        let Some(channel) = channels.device_by_node(node) else {
            inic_warn!("Destroy result from unknown device {}", node);
            return;
        };
        let mut ctx = XrmContext {
            scheduler,
            timers,
            channels: &*channels,
            controller,
            sink,
            now: *now,
        };
        let delivered = channel.destroy.notify(&result, true, |w, r| {
            if let Some(xrm) = managers.get_mut(w.0 as usize) {
                xrm.on_destroy_result(r, &mut ctx);
            }
        });
        if !delivered {
            inic_warn!("Nobody waits for destroy result of {}", node);
        }
    }

    /// Delivers the answer of `node` to a sync request.
    pub fn complete_sync(&mut self, node: NodeAddress, result: SyncResult) {
        let Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now,
        } = self;
        let Some(channel) = channels.device_by_node(node) else {
            inic_warn!("Sync result from unknown device {}", node);
            return;
        };
        let mut ctx = XrmContext {
            scheduler,
            timers,
            channels: &*channels,
            controller,
            sink,
            now: *now,
        };
        let delivered = channel.sync.notify(&result, true, |w, r| {
            if let Some(xrm) = managers.get_mut(w.0 as usize) {
                xrm.on_sync_result(r, &mut ctx);
            }
        });
        if !delivered {
            inic_warn!("Nobody waits for sync result of {}", node);
        }
    }

    /// A transmit buffer became free. Returns the number of managers
    /// retrying.
    pub fn buffer_available(&mut self) -> usize {
        let Self {
            scheduler,
            timers,
            channels,
            managers,
            controller,
            sink,
            now,
        } = self;
        let mut ctx = XrmContext {
            scheduler,
            timers,
            channels: &*channels,
            controller,
            sink,
            now: *now,
        };
        channels.buffer_available().notify(&(), |w, _| {
            if let Some(xrm) = managers.get_mut(w.0 as usize) {
                xrm.on_buffer_available(&mut ctx);
            }
        })
    }

    /// Delivers an unsolicited status change of a device.
    pub fn device_notice(&mut self, notice: &DeviceNotice) {
        let Self {
            scheduler,
            channels,
            managers,
            ..
        } = self;
        let informed = channels.notices().notify(notice, notice.mask(), |w, n| {
            if let Some(xrm) = managers.get_mut(w.0 as usize) {
                xrm.on_device_notice(n, scheduler);
            }
        });
        inic_debug!("{:?} sent to {} manager(s)", notice, informed);
    }

    /// The controller.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// The controller, e.g. to change its link state.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// The report sink.
    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// The report sink, e.g. to drain received reports.
    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }
}

impl<C, R, const JOBS: usize, const HANDLES: usize> JobControl for Runtime<'_, C, R, JOBS, HANDLES>
where
    C: Controller,
    R: ReportSink,
{
    fn process(
        &mut self,
        node: NodeAddress,
        list: ListId,
        label: ConnectionLabel,
        user_arg: UserArg,
    ) -> Result<(), XrmError> {
        Runtime::process(self, node, list, label, user_arg)
    }

    fn destroy(&mut self, node: NodeAddress, list: ListId) -> Result<(), XrmError> {
        Runtime::destroy(self, node, list)
    }
}
