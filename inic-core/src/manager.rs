//! Extended resource manager.
//!
//! One manager serves one device. It walks a resource list creating every
//! resource not yet present, shares resources with other lists of the same
//! device, and destroys them again in reverse order once no other list uses
//! them. Only one build or destroy runs at a time; requests arriving in the
//! meantime are refused with [`XrmError::ApiLocked`].

use crate::{
    config::{StackConfig, DESTROY_BATCH_CAPACITY, MAX_NOTICE_HANDLES},
    handle::HandleTable,
    inic::*,
    job::{JobId, JobPool},
    report::*,
    resource::*,
    scheduler::{EventMask, ScheduleError, Scheduler, ServiceId},
    subject::SingleSubject,
    timer::{TimerId, Timers},
};
use core::{
    fmt::{Debug, Display, Formatter},
    time::Duration,
};
use heapless::Vec;

const EVENT_PROCESS: EventMask = 1 << 0;
const EVENT_DESTROY: EventMask = 1 << 1;
const EVENT_INVALIDATE: EventMask = 1 << 2;
const EVENT_NOTIFY_INVALID: EventMask = 1 << 3;
const EVENT_TIMEOUT: EventMask = 1 << 4;

/// Everything outside of a manager it works with while servicing events.
pub struct XrmContext<'c> {
    /// Scheduler the manager is registered with
    pub scheduler: &'c mut Scheduler,
    /// Timers, including the command timeout of the manager
    pub timers: &'c mut Timers,
    /// Result subjects
    pub channels: &'c CommandChannels,
    /// Command access to the devices
    pub controller: &'c mut dyn Controller,
    /// Receiver of reports
    pub sink: &'c mut dyn ReportSink,
    /// Current time
    pub now: Duration,
}

impl Debug for XrmContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("XrmContext")
            .field("scheduler", &self.scheduler)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// A request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrmError {
    /// Another build or destroy is running.
    ApiLocked,
    /// The list does not exist in the catalog.
    UnknownList,
    /// No free job slot.
    NoJobSlot,
    /// The list is already built.
    AlreadyBuilt,
    /// The list holds no resources.
    AlreadyDestroyed,
    /// No manager serves the device.
    UnknownDevice,
}

impl Display for XrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ApiLocked => write!(f, "Another job operation is running"),
            Self::UnknownList => write!(f, "Unknown resource list"),
            Self::NoJobSlot => write!(f, "No free job slot"),
            Self::AlreadyBuilt => write!(f, "Resource list is already built"),
            Self::AlreadyDestroyed => write!(f, "Resource list holds no resources"),
            Self::UnknownDevice => write!(f, "No resource manager for device"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    /// Resources before `index` are present.
    Building {
        job: JobId,
        index: usize,
    },
    Destroying {
        job: JobId,
    },
}

impl EngineState {
    fn job(self) -> Option<JobId> {
        match self {
            Self::Idle => None,
            Self::Building { job, .. } | Self::Destroying { job } => Some(job),
        }
    }
}

/// What the manager waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Create,
    Destroy,
    Sync,
    Buffer,
}

#[derive(Debug, Default)]
struct Invalidation {
    all: bool,
    handles: Vec<ResourceHandle, MAX_NOTICE_HANDLES>,
}

/// Builds and destroys the resource lists of one device.
pub struct ResourceManager<'a, const JOBS: usize, const HANDLES: usize> {
    node: NodeAddress,
    waiter: Waiter,
    service: ServiceId,
    timer: TimerId,
    timeout: Duration,
    destroy_batch: usize,
    catalog: &'a dyn ResourceLists,
    jobs: JobPool<JOBS>,
    handles: HandleTable<HANDLES>,
    state: EngineState,
    pending: Pending,
    batch: Vec<ResourceHandle, DESTROY_BATCH_CAPACITY>,
    invalidation: Invalidation,
}

impl<const JOBS: usize, const HANDLES: usize> Debug for ResourceManager<'_, JOBS, HANDLES> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("node", &self.node)
            .field("service", &self.service)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("jobs", &self.jobs)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl<'a, const JOBS: usize, const HANDLES: usize> ResourceManager<'a, JOBS, HANDLES> {
    /// Creates the manager of `node`, registering its service and timeout
    /// timer.
    ///
    /// # Errors
    /// Returns an error if no service or timer slot is left.
    pub fn new(
        node: NodeAddress,
        waiter: Waiter,
        catalog: &'a dyn ResourceLists,
        cfg: &StackConfig,
        scheduler: &mut Scheduler,
        timers: &mut Timers,
    ) -> Result<Self, ScheduleError> {
        let service = scheduler.register(cfg.service_priority)?;
        let timer = timers.create(service, EVENT_TIMEOUT)?;
        Ok(Self {
            node,
            waiter,
            service,
            timer,
            timeout: cfg.command_timeout,
            destroy_batch: (cfg.destroy_batch as usize).clamp(1, DESTROY_BATCH_CAPACITY),
            catalog,
            jobs: JobPool::default(),
            handles: HandleTable::default(),
            state: EngineState::Idle,
            pending: Pending::None,
            batch: Vec::new(),
            invalidation: Invalidation::default(),
        })
    }

    /// Device served by this manager.
    pub fn node(&self) -> NodeAddress {
        self.node
    }

    /// Observer identity of this manager.
    pub fn waiter(&self) -> Waiter {
        self.waiter
    }

    /// Scheduler service of this manager.
    pub fn service_id(&self) -> ServiceId {
        self.service
    }

    /// Whether a build or destroy is running.
    pub fn is_locked(&self) -> bool {
        self.state != EngineState::Idle
    }

    /// Whether every resource of `list` exists.
    pub fn is_built(&self, list: ListId) -> bool {
        self.jobs
            .find(list)
            .is_some_and(|job| self.jobs.get(job).built)
    }

    /// Handle of `resource` as used by `list`.
    pub fn resource_handle(&self, list: ListId, resource: ResourceId) -> Option<ResourceHandle> {
        self.handles.held_by(self.jobs.find(list)?, resource)
    }

    /// Number of lists using `handle`.
    pub fn reference_count(&self, handle: ResourceHandle) -> usize {
        self.handles.reference_count(handle)
    }

    /// Number of handle table entries in use.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of bound job slots.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Starts building `list`. The outcome is reported to the sink.
    ///
    /// `label` is the connection input MOST sockets are attached to. It is
    /// replaced by the label the device allocates for an output MOST socket.
    ///
    /// # Errors
    /// Returns an error if another operation runs, the list is unknown or
    /// already built, or no job slot is free.
    pub fn process(
        &mut self,
        list: ListId,
        label: ConnectionLabel,
        user_arg: UserArg,
        scheduler: &mut Scheduler,
    ) -> Result<(), XrmError> {
        if self.is_locked() {
            return Err(XrmError::ApiLocked);
        }
        if self.catalog.list(list).is_none() {
            return Err(XrmError::UnknownList);
        }
        if self.is_built(list) {
            return Err(XrmError::AlreadyBuilt);
        }
        let job = self.jobs.bind(list).ok_or(XrmError::NoJobSlot)?;
        let resumed = self.handles.has_entries(job);
        let entry = self.jobs.get_mut(job);
        if !resumed {
            entry.label = label;
        }
        entry.user_arg = user_arg;
        self.state = EngineState::Building { job, index: 0 };
        scheduler.set_event(self.service, EVENT_PROCESS);
        inic_debug!("Building list {:?} on {}", list, self.node);
        Ok(())
    }

    /// Starts destroying `list`. The outcome is reported to the sink.
    ///
    /// # Errors
    /// Returns an error if another operation runs, the list is unknown or
    /// holds no resources.
    pub fn destroy(&mut self, list: ListId, scheduler: &mut Scheduler) -> Result<(), XrmError> {
        if self.is_locked() {
            return Err(XrmError::ApiLocked);
        }
        if self.catalog.list(list).is_none() {
            return Err(XrmError::UnknownList);
        }
        let job = self.jobs.find(list).ok_or(XrmError::AlreadyDestroyed)?;
        if !self.jobs.get(job).built && !self.handles.has_entries(job) {
            return Err(XrmError::AlreadyDestroyed);
        }
        self.batch.clear();
        self.state = EngineState::Destroying { job };
        scheduler.set_event(self.service, EVENT_DESTROY);
        inic_debug!("Destroying list {:?} on {}", list, self.node);
        Ok(())
    }

    /// Services the scheduler events of this manager.
    pub fn service(&mut self, events: EventMask, ctx: &mut XrmContext<'_>) {
        if events & EVENT_INVALIDATE != 0 {
            self.apply_invalidation(ctx);
        }
        if events & EVENT_TIMEOUT != 0 {
            self.on_timeout(ctx);
        }
        if events & EVENT_PROCESS != 0 {
            self.build_step(ctx);
        }
        if events & EVENT_DESTROY != 0 {
            self.destroy_step(ctx);
        }
        if events & EVENT_NOTIFY_INVALID != 0 {
            self.notify_invalid_jobs(ctx);
        }
    }

    /// Receives the answer to a create command.
    pub fn on_create_result(&mut self, result: &CreateResult, ctx: &mut XrmContext<'_>) {
        if !self.accept(Pending::Create, ctx) {
            return;
        }
        let EngineState::Building { job, index } = self.state else {
            return;
        };
        let Some(resource) = self.list_of(job).and_then(|l| l.get(index).copied()) else {
            return;
        };
        match result {
            Ok(response) => {
                if self.handles.store(job, resource, response.handle).is_err() {
                    inic_warn!("No entry left for handle {}", response.handle);
                    let r = self.step_result(ResultCode::ConfigError, job, index);
                    self.finish(job, r, ctx);
                    return;
                }
                if let Some(label) = response.connection_label {
                    self.jobs.get_mut(job).label = label;
                }
                self.resource_debug(job, resource, ResourceEvent::Built, ctx);
                self.state = EngineState::Building {
                    job,
                    index: index + 1,
                };
                ctx.scheduler.set_event(self.service, EVENT_PROCESS);
            }
            Err(e) => {
                self.resource_debug(job, resource, ResourceEvent::BuildFailed, ctx);
                let mut r = self.step_result(ResultCode::BuildError, job, index);
                r.details.target = Some(*e);
                self.finish(job, r, ctx);
            }
        }
    }

    /// Receives the answer to a destroy command.
    pub fn on_destroy_result(&mut self, result: &DestroyResult, ctx: &mut XrmContext<'_>) {
        if !self.accept(Pending::Destroy, ctx) {
            return;
        }
        let EngineState::Destroying { job } = self.state else {
            return;
        };
        let released = match result {
            Ok(()) | Err(DeviceError::HandleNotFound) => self.batch.len(),
            Err(DeviceError::Busy { refused_at }) => (*refused_at).min(self.batch.len()),
            Err(e) => {
                let mut r = JobResult::new(ResultCode::DestroyError);
                r.details.target = Some(*e);
                self.finish(job, r, ctx);
                return;
            }
        };
        for i in 0..released {
            let handle = self.batch[i];
            if let Some(resource) = self.handles.release_handle(job, handle) {
                self.resource_debug(job, resource, ResourceEvent::Destroyed, ctx);
            }
        }
        self.batch = Vec::from_slice(&self.batch[released..]).unwrap_or_default();
        ctx.scheduler.set_event(self.service, EVENT_DESTROY);
    }

    /// Receives the answer to a sync request.
    pub fn on_sync_result(&mut self, result: &SyncResult, ctx: &mut XrmContext<'_>) {
        if !self.accept(Pending::Sync, ctx) {
            return;
        }
        let Some(job) = self.state.job() else {
            return;
        };
        match result {
            Ok(()) => ctx.scheduler.set_event(self.service, EVENT_PROCESS),
            Err(e) => {
                let mut r = JobResult::new(ResultCode::SyncError);
                r.details.target = Some(*e);
                self.finish(job, r, ctx);
            }
        }
    }

    /// A transmit buffer became free. Retries the step that overflowed.
    pub fn on_buffer_available(&mut self, ctx: &mut XrmContext<'_>) {
        _ = ctx.channels.buffer_available().remove_observer(self.waiter);
        if self.pending != Pending::Buffer {
            return;
        }
        self.pending = Pending::None;
        match self.state {
            EngineState::Building { .. } => ctx.scheduler.set_event(self.service, EVENT_PROCESS),
            EngineState::Destroying { .. } => ctx.scheduler.set_event(self.service, EVENT_DESTROY),
            EngineState::Idle => {}
        }
    }

    /// Queues the invalidation caused by `notice`, if it concerns this
    /// device.
    pub fn on_device_notice(&mut self, notice: &DeviceNotice, scheduler: &mut Scheduler) {
        match notice {
            DeviceNotice::SyncLost(node) if *node == self.node => self.invalidation.all = true,
            DeviceNotice::NetworkNotAvailable => self.invalidation.all = true,
            DeviceNotice::ResourcesDestroyed { node, handles } if *node == self.node => {
                for h in handles {
                    if self.invalidation.handles.push(*h).is_err() {
                        inic_warn!("Too many destroyed handles, invalidating all of {}", self.node);
                        self.invalidation.all = true;
                        break;
                    }
                }
            }
            _ => return,
        }
        scheduler.set_event(self.service, EVENT_INVALIDATE);
    }

    fn list_of(&self, job: JobId) -> Option<&'a [ResourceId]> {
        let catalog = self.catalog;
        self.jobs.get(job).list.and_then(|l| catalog.list(l))
    }

    fn build_step(&mut self, ctx: &mut XrmContext<'_>) {
        let EngineState::Building { job, mut index } = self.state else {
            return;
        };
        if self.pending != Pending::None {
            return;
        }
        let catalog = self.catalog;
        let Some(list) = self.list_of(job) else {
            self.finish(job, ResultCode::InvalidListError.into(), ctx);
            return;
        };
        let (resource, object) = loop {
            let Some(&resource) = list.get(index) else {
                self.finish(job, ResultCode::BuildSuccess.into(), ctx);
                return;
            };
            let Some(object) = catalog.resource(resource) else {
                let r = self.step_result(ResultCode::InvalidListError, job, index);
                self.finish(job, r, ctx);
                return;
            };
            let present = matches!(object, ResourceObject::DefaultCreatedPort(_))
                || self.handles.held_by(job, resource).is_some();
            if !present {
                let Some(handle) = self.handles.lookup(resource) else {
                    break (resource, object);
                };
                if self.handles.store(job, resource, handle).is_err() {
                    let r = self.step_result(ResultCode::ConfigError, job, index);
                    self.finish(job, r, ctx);
                    return;
                }
                inic_trace!("List shares {:?} as {}", resource, handle);
            }
            index += 1;
        };
        self.state = EngineState::Building { job, index };

        if self.handles.len() >= HANDLES {
            inic_warn!("Handle table of {} is full", self.node);
            let r = self.step_result(ResultCode::ConfigError, job, index);
            self.finish(job, r, ctx);
            return;
        }
        if !ctx.controller.is_synced(self.node) {
            self.request_sync(job, ctx);
            return;
        }
        let Some(command) = self.create_command(job, object) else {
            inic_warn!("{:?} depends on a resource that does not exist", resource);
            let r = self.step_result(ResultCode::ConfigError, job, index);
            self.finish(job, r, ctx);
            return;
        };
        match ctx.controller.create_resource(self.node, command) {
            Ok(()) => self.await_result(Pending::Create, ctx),
            Err(CommandError::BufferOverflow) => self.await_buffer(ctx),
            Err(e) => {
                self.resource_debug(job, resource, ResourceEvent::BuildFailed, ctx);
                let mut r = self.step_result(ResultCode::BuildError, job, index);
                r.details.transmission = Some(e);
                self.finish(job, r, ctx);
            }
        }
    }

    fn request_sync(&mut self, job: JobId, ctx: &mut XrmContext<'_>) {
        inic_debug!("Attaching remote controller of {}", self.node);
        match ctx.controller.request_sync(self.node) {
            Ok(()) => self.await_result(Pending::Sync, ctx),
            Err(CommandError::BufferOverflow) => self.await_buffer(ctx),
            Err(e) => {
                let mut r = JobResult::new(ResultCode::SyncError);
                r.details.transmission = Some(e);
                self.finish(job, r, ctx);
            }
        }
    }

    /// Handle under which the device knows `resource`.
    fn resolve(&self, resource: ResourceId) -> Option<ResourceHandle> {
        match self.catalog.resource(resource)? {
            ResourceObject::DefaultCreatedPort(p) => Some(p.handle()),
            _ => self.handles.lookup(resource),
        }
    }

    fn create_command(&self, job: JobId, object: &'a ResourceObject) -> Option<CreateCommand<'a>> {
        use ResourceObject as R;
        let command = match object {
            R::MostSocket(socket) => CreateCommand::MostSocket {
                socket,
                label: self.jobs.get(job).label,
            },
            R::MlbPort(p) => CreateCommand::MlbPort(p),
            R::MlbSocket(socket) => CreateCommand::MlbSocket {
                socket,
                port: self.resolve(socket.port)?,
            },
            R::UsbPort(p) => CreateCommand::UsbPort(p),
            R::UsbSocket(socket) => CreateCommand::UsbSocket {
                socket,
                port: self.resolve(socket.port)?,
            },
            R::RmckPort(p) => CreateCommand::RmckPort(p),
            R::StreamPort(p) => CreateCommand::StreamPort(p),
            R::StreamSocket(socket) => CreateCommand::StreamSocket {
                socket,
                port: self.resolve(socket.port)?,
            },
            R::SyncConnection(connection) => CreateCommand::SyncConnection {
                connection,
                socket_in: self.resolve(connection.socket_in)?,
                socket_out: self.resolve(connection.socket_out)?,
            },
            R::DfiPhaseConnection(connection) => CreateCommand::DfiPhaseConnection {
                connection,
                socket_in: self.resolve(connection.socket_in)?,
                socket_out: self.resolve(connection.socket_out)?,
            },
            R::Combiner(combiner) => CreateCommand::Combiner {
                combiner,
                port_socket: self.resolve(combiner.port_socket)?,
            },
            R::Splitter(splitter) => CreateCommand::Splitter {
                splitter,
                socket_in: self.resolve(splitter.socket_in)?,
            },
            R::AvpConnection(connection) => CreateCommand::AvpConnection {
                connection,
                socket_in: self.resolve(connection.socket_in)?,
                socket_out: self.resolve(connection.socket_out)?,
            },
            R::QosConnection(connection) => CreateCommand::QosConnection {
                connection,
                socket_in: self.resolve(connection.socket_in)?,
                socket_out: self.resolve(connection.socket_out)?,
            },
            R::DefaultCreatedPort(_) => return None,
        };
        Some(command)
    }

    fn destroy_step(&mut self, ctx: &mut XrmContext<'_>) {
        let EngineState::Destroying { job } = self.state else {
            return;
        };
        if self.pending != Pending::None {
            return;
        }
        if self.batch.is_empty() {
            self.prepare_batch(job, ctx);
        }
        if self.batch.is_empty() {
            self.finish(job, ResultCode::DestroySuccess.into(), ctx);
            return;
        }
        match ctx.controller.destroy_resources(self.node, &self.batch) {
            Ok(()) => self.await_result(Pending::Destroy, ctx),
            Err(CommandError::BufferOverflow) => self.await_buffer(ctx),
            Err(e) => {
                let mut r = JobResult::new(ResultCode::DestroyError);
                r.details.transmission = Some(e);
                self.finish(job, r, ctx);
            }
        }
    }

    /// Collects the next handles to destroy in reverse list order. Shared
    /// resources are only released by this job.
    fn prepare_batch(&mut self, job: JobId, ctx: &mut XrmContext<'_>) {
        let Some(list) = self.list_of(job) else {
            return;
        };
        for &resource in list.iter().rev() {
            let Some(handle) = self.handles.held_by(job, resource) else {
                continue;
            };
            if self.handles.reference_count(handle) > 1 {
                _ = self.handles.release_resource(job, resource);
                self.resource_debug(job, resource, ResourceEvent::Destroyed, ctx);
            } else if self.batch.len() < self.destroy_batch {
                _ = self.batch.push(handle);
            } else {
                break;
            }
        }
    }

    fn subject(channel: &DeviceChannel, pending: Pending) -> Option<&SingleSubject<Waiter>> {
        match pending {
            Pending::Create => Some(&channel.create),
            Pending::Destroy => Some(&channel.destroy),
            Pending::Sync => Some(&channel.sync),
            Pending::None | Pending::Buffer => None,
        }
    }

    fn await_result(&mut self, pending: Pending, ctx: &mut XrmContext<'_>) {
        let subject = ctx
            .channels
            .device(self.waiter)
            .and_then(|c| Self::subject(c, pending));
        match subject.map(|s| s.add_observer(self.waiter)) {
            Some(Ok(_)) => {}
            Some(Err(e)) => inic_warn!("Cannot wait for {:?} result: {}", pending, e),
            None => inic_warn!("No channel for {}", self.node),
        }
        ctx.timers.start(self.timer, ctx.now, self.timeout, None);
        self.pending = pending;
    }

    fn await_buffer(&mut self, ctx: &mut XrmContext<'_>) {
        inic_trace!("Waiting for a free transmit buffer");
        if let Err(e) = ctx.channels.buffer_available().add_observer(self.waiter) {
            inic_warn!("Cannot wait for a transmit buffer: {}", e);
        }
        self.pending = Pending::Buffer;
    }

    /// Takes the answer the manager waits for. Answers that are not awaited
    /// are dropped.
    fn accept(&mut self, pending: Pending, ctx: &mut XrmContext<'_>) -> bool {
        if self.pending != pending {
            inic_warn!("Dropped unexpected {:?} result on {}", pending, self.node);
            return false;
        }
        ctx.timers.stop(self.timer);
        self.pending = Pending::None;
        true
    }

    fn cancel_wait(&mut self, ctx: &mut XrmContext<'_>) {
        match self.pending {
            Pending::Buffer => {
                _ = ctx.channels.buffer_available().remove_observer(self.waiter);
            }
            Pending::None => {}
            pending => {
                if let Some(s) = ctx
                    .channels
                    .device(self.waiter)
                    .and_then(|c| Self::subject(c, pending))
                {
                    _ = s.remove_observer(self.waiter);
                }
            }
        }
        ctx.timers.stop(self.timer);
        self.pending = Pending::None;
    }

    fn on_timeout(&mut self, ctx: &mut XrmContext<'_>) {
        let Some(job) = self.state.job() else {
            return;
        };
        let code = match self.pending {
            Pending::Create => ResultCode::BuildError,
            Pending::Destroy => ResultCode::DestroyError,
            Pending::Sync => ResultCode::SyncError,
            Pending::None | Pending::Buffer => return,
        };
        inic_warn!("{} did not answer {:?} in time", self.node, self.pending);
        self.cancel_wait(ctx);
        let mut r = match self.state {
            EngineState::Building { index, .. } if code == ResultCode::BuildError => {
                self.step_result(code, job, index)
            }
            _ => JobResult::new(code),
        };
        r.details.target = Some(DeviceError::Timeout);
        self.finish(job, r, ctx);
    }

    fn step_result(&self, code: ResultCode, job: JobId, index: usize) -> JobResult {
        let mut r = JobResult::new(code);
        r.details.resource_index = Some(index);
        r.details.resource_type = self
            .list_of(job)
            .and_then(|l| l.get(index))
            .and_then(|id| self.catalog.resource(*id))
            .map(ResourceObject::resource_type);
        r
    }

    fn resource_debug(
        &self,
        job: JobId,
        resource: ResourceId,
        event: ResourceEvent,
        ctx: &mut XrmContext<'_>,
    ) {
        let Some(object) = self.catalog.resource(resource) else {
            return;
        };
        let entry = self.jobs.get(job);
        ctx.sink.resource_debug(&ResourceDebug {
            node: self.node,
            resource,
            resource_type: object.resource_type(),
            event,
            list: entry.list.unwrap_or_default(),
            user_arg: entry.user_arg,
        });
    }

    /// Ends the running operation and reports its outcome.
    fn finish(&mut self, job: JobId, result: JobResult, ctx: &mut XrmContext<'_>) {
        ctx.timers.stop(self.timer);
        self.state = EngineState::Idle;
        self.pending = Pending::None;
        self.batch.clear();

        let entry = self.jobs.get_mut(job);
        match result.code {
            ResultCode::BuildSuccess => entry.built = true,
            ResultCode::DestroyError | ResultCode::AutoDestroyed => {}
            _ => entry.built = false,
        }
        let report = JobReport {
            node: self.node,
            list: entry.list.unwrap_or_default(),
            connection_label: entry.label,
            result,
            user_arg: entry.user_arg,
        };
        if !entry.built && !entry.notify && !self.handles.has_entries(job) {
            self.jobs.release(job);
        }
        inic_debug!("List {:?} on {}: {}", report.list, self.node, result);
        ctx.sink.report(&report);
    }

    fn apply_invalidation(&mut self, ctx: &mut XrmContext<'_>) {
        let invalidation = core::mem::take(&mut self.invalidation);
        let current = self.state.job();
        let mut affected: Vec<JobId, JOBS> = Vec::new();
        for job in self.jobs.active() {
            let hit = if invalidation.all {
                current == Some(job) || self.handles.has_entries(job)
            } else {
                invalidation
                    .handles
                    .iter()
                    .any(|h| self.handles.holds(job, *h))
            };
            if hit {
                _ = affected.push(job);
            }
        }
        if affected.is_empty() {
            return;
        }

        for &job in affected.iter() {
            let mut cleared: Vec<ResourceId, HANDLES> = Vec::new();
            self.handles.clear_job(job, |r| {
                _ = cleared.push(r);
            });
            for r in cleared {
                self.resource_debug(job, r, ResourceEvent::Destroyed, ctx);
            }
            let entry = self.jobs.get_mut(job);
            entry.built = false;
            entry.notify = true;
        }
        if current.is_some_and(|j| affected.contains(&j)) {
            inic_debug!("Cancelling running operation on {}", self.node);
            self.cancel_wait(ctx);
            self.state = EngineState::Idle;
            self.batch.clear();
        }
        inic_debug!("{} job(s) on {} invalidated", affected.len(), self.node);
        ctx.scheduler.set_event(self.service, EVENT_NOTIFY_INVALID);
    }

    /// Reports every invalidated job once and frees its slot.
    fn notify_invalid_jobs(&mut self, ctx: &mut XrmContext<'_>) {
        let flagged: Vec<JobId, JOBS> = self
            .jobs
            .active()
            .filter(|j| self.jobs.get(*j).notify)
            .collect();
        for job in flagged {
            let entry = self.jobs.get_mut(job);
            entry.notify = false;
            let report = JobReport {
                node: self.node,
                list: entry.list.unwrap_or_default(),
                connection_label: entry.label,
                result: ResultCode::AutoDestroyed.into(),
                user_arg: entry.user_arg,
            };
            if self.state.job() != Some(job) && !self.handles.has_entries(job) {
                self.jobs.release(job);
            }
            ctx.sink.report(&report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Priority;

    #[derive(Default)]
    struct Refusing;

    impl Controller for Refusing {
        fn create_resource(&mut self, _: NodeAddress, _: CreateCommand<'_>) -> Result<(), CommandError> {
            Err(CommandError::NotAvailable)
        }

        fn destroy_resources(&mut self, _: NodeAddress, _: &[ResourceHandle]) -> Result<(), CommandError> {
            Err(CommandError::NotAvailable)
        }

        fn is_synced(&self, _: NodeAddress) -> bool {
            true
        }

        fn request_sync(&mut self, _: NodeAddress) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Reports(Vec<JobReport, 4>);

    impl ReportSink for Reports {
        fn report(&mut self, report: &JobReport) {
            _ = self.0.push(*report);
        }
    }

    fn catalog() -> ResourceCatalog<2, 1, 2> {
        let mut b = ResourceCatalog::builder();
        let port = b
            .resource(ResourceObject::RmckPort(RmckPort {
                index: 0,
                clock_source: RmckClockSource::Network,
                divisor: 1,
            }))
            .unwrap();
        _ = b.list(&[port]).unwrap();
        b.build()
    }

    #[test]
    fn requests_are_refused_while_locked() {
        let catalog = catalog();
        let cfg = StackConfig::default();
        let mut sched = Scheduler::new();
        let mut timers = Timers::new();
        let mut xrm = ResourceManager::<2, 4>::new(
            NodeAddress(1),
            Waiter(0),
            &catalog,
            &cfg,
            &mut sched,
            &mut timers,
        )
        .unwrap();
        assert_eq!(xrm.destroy(ListId(0), &mut sched), Err(XrmError::AlreadyDestroyed));
        assert_eq!(
            xrm.process(ListId(1), ConnectionLabel(0), 0, &mut sched),
            Err(XrmError::UnknownList)
        );
        xrm.process(ListId(0), ConnectionLabel(0), 0, &mut sched)
            .unwrap();
        assert!(xrm.is_locked());
        assert_eq!(
            xrm.process(ListId(0), ConnectionLabel(0), 0, &mut sched),
            Err(XrmError::ApiLocked)
        );
        assert_eq!(xrm.destroy(ListId(0), &mut sched), Err(XrmError::ApiLocked));
    }

    #[test]
    fn transmission_error_fails_build_and_frees_slot() {
        let catalog = catalog();
        let cfg = StackConfig::default();
        let mut sched = Scheduler::new();
        let mut timers = Timers::new();
        let mut channels = CommandChannels::new();
        let waiter = channels.add_device(NodeAddress(1)).unwrap();
        let mut xrm = ResourceManager::<2, 4>::new(
            NodeAddress(1),
            waiter,
            &catalog,
            &cfg,
            &mut sched,
            &mut timers,
        )
        .unwrap();
        let mut controller = Refusing;
        let mut sink = Reports::default();
        xrm.process(ListId(0), ConnectionLabel(7), 42, &mut sched)
            .unwrap();
        _ = sched.run_once(|sched, _, events| {
            let mut ctx = XrmContext {
                scheduler: sched,
                timers: &mut timers,
                channels: &channels,
                controller: &mut controller,
                sink: &mut sink,
                now: Duration::ZERO,
            };
            xrm.service(events, &mut ctx);
        });
        let report = sink.0[0];
        assert_eq!(report.result.code, ResultCode::BuildError);
        assert_eq!(
            report.result.details.transmission,
            Some(CommandError::NotAvailable)
        );
        assert_eq!(report.result.details.resource_index, Some(0));
        assert_eq!(report.user_arg, 42);
        assert!(!xrm.is_locked());
        assert_eq!(xrm.job_count(), 0);
    }

    #[test]
    fn priority_comes_from_config() {
        let catalog = catalog();
        let cfg = StackConfig {
            service_priority: Priority(9),
            ..Default::default()
        };
        let mut sched = Scheduler::new();
        let first = sched.register(Priority(10)).unwrap();
        let mut timers = Timers::new();
        let xrm = ResourceManager::<1, 1>::new(
            NodeAddress(1),
            Waiter(0),
            &catalog,
            &cfg,
            &mut sched,
            &mut timers,
        )
        .unwrap();
        sched.set_event(first, 1);
        sched.set_event(xrm.service_id(), 1);
        let mut order: Vec<ServiceId, 2> = Vec::new();
        _ = sched.run_once(|_, id, _| {
            _ = order.push(id);
        });
        assert_eq!(order.as_slice(), &[xrm.service_id(), first]);
    }
}
