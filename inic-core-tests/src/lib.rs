pub mod test_data {
    pub const CFG: &str = r##"
stack:
  service_priority: 4
  command_timeout:
    secs: 0
    nanos: 200000000
  destroy_batch: 4
  devices: [ 256, 512 ]
catalog:
  resources:
    - !most_socket
      most_port_handle: 3328
      direction: output
      data_type: sync
      bandwidth: 4
    - !stream_port
      index: 0
      clock_config: fs64
      data_alignment: left16_bit
    - !stream_socket
      port: 1
      direction: input
      data_type: sync
      bandwidth: 4
      stream_pin_id: srx_a0
    - !sync_connection
      socket_in: 2
      socket_out: 0
      mute_mode: no_muting
      offset: 0
    - !default_created_port
      port_type: mlb
      index: 0
    - !mlb_socket
      port: 4
      direction: output
      data_type: isoc
      bandwidth: 188
      channel_address: 10
  lists:
    - [ 1, 2, 0, 3 ]
    - [ 4, 5 ]
"##;
}

use core::time::Duration;
use heapless::Vec;
use inic_core::prelude::*;

/// Device used by most tests.
pub const NODE: NodeAddress = NodeAddress(0x100);

/// Label a mock device allocates for output MOST sockets.
pub const LABEL: ConnectionLabel = ConnectionLabel(0x10);

/// First handle a mock device hands out.
pub const FIRST_HANDLE: ResourceHandle = ResourceHandle(0x100);

pub type Catalog = ResourceCatalog<16, 8, 8>;

pub type TestRuntime<'a> = Runtime<'a, MockController, RecordingSink, 8, 16>;

/// A command as seen by the mock device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        node: NodeAddress,
        resource_type: ResourceType,
        dependencies: Vec<ResourceHandle, 2>,
        /// Label handed over with a MOST socket
        label: Option<ConnectionLabel>,
        /// An output MOST socket asks the device for a label.
        allocates_label: bool,
    },
    Destroy {
        node: NodeAddress,
        handles: Vec<ResourceHandle, 10>,
    },
    Sync(NodeAddress),
}

fn dependencies(command: &CreateCommand<'_>) -> Vec<ResourceHandle, 2> {
    let handles = |h: &[ResourceHandle]| Vec::from_slice(h).unwrap();
    match command {
        CreateCommand::MlbSocket { port, .. }
        | CreateCommand::UsbSocket { port, .. }
        | CreateCommand::StreamSocket { port, .. } => handles(&[*port]),
        CreateCommand::SyncConnection {
            socket_in,
            socket_out,
            ..
        }
        | CreateCommand::DfiPhaseConnection {
            socket_in,
            socket_out,
            ..
        }
        | CreateCommand::AvpConnection {
            socket_in,
            socket_out,
            ..
        }
        | CreateCommand::QosConnection {
            socket_in,
            socket_out,
            ..
        } => handles(&[*socket_in, *socket_out]),
        CreateCommand::Combiner { port_socket, .. } => handles(&[*port_socket]),
        CreateCommand::Splitter { socket_in, .. } => handles(&[*socket_in]),
        CreateCommand::MostSocket { .. }
        | CreateCommand::MlbPort(_)
        | CreateCommand::UsbPort(_)
        | CreateCommand::RmckPort(_)
        | CreateCommand::StreamPort(_) => Vec::new(),
    }
}

/// Records every command and refuses the ones it is told to.
#[derive(Debug)]
pub struct MockController {
    pub commands: Vec<Command, 64>,
    pub synced: bool,
    refusals: Vec<CommandError, 8>,
    answered: usize,
    next_handle: u16,
}

impl Default for MockController {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            synced: true,
            refusals: Vec::new(),
            answered: 0,
            next_handle: FIRST_HANDLE.0,
        }
    }
}

impl MockController {
    /// Makes the next command fail with `error`.
    pub fn refuse_next(&mut self, error: CommandError) {
        self.refusals.push(error).unwrap();
    }

    fn refusal(&mut self) -> Result<(), CommandError> {
        if self.refusals.is_empty() {
            return Ok(());
        }
        Err(self.refusals.remove(0))
    }

    /// The oldest command not handed out by this method yet.
    pub fn next_unanswered(&mut self) -> Option<Command> {
        let c = self.commands.get(self.answered).cloned();
        if c.is_some() {
            self.answered += 1;
        }
        c
    }

    /// Handle for the next created resource.
    pub fn allocate(&mut self) -> ResourceHandle {
        let h = ResourceHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    pub fn creates(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Create { .. }))
            .count()
    }

    pub fn last(&self) -> Option<&Command> {
        self.commands.last()
    }
}

impl Controller for MockController {
    fn create_resource(
        &mut self,
        node: NodeAddress,
        command: CreateCommand<'_>,
    ) -> Result<(), CommandError> {
        self.refusal()?;
        let (label, allocates_label) = match command {
            CreateCommand::MostSocket { socket, label } => {
                (Some(label), socket.direction == SocketDirection::Output)
            }
            _ => (None, false),
        };
        self.commands
            .push(Command::Create {
                node,
                resource_type: command.resource_type(),
                dependencies: dependencies(&command),
                label,
                allocates_label,
            })
            .unwrap();
        Ok(())
    }

    fn destroy_resources(
        &mut self,
        node: NodeAddress,
        handles: &[ResourceHandle],
    ) -> Result<(), CommandError> {
        self.refusal()?;
        self.commands
            .push(Command::Destroy {
                node,
                handles: Vec::from_slice(handles).unwrap(),
            })
            .unwrap();
        Ok(())
    }

    fn is_synced(&self, _node: NodeAddress) -> bool {
        self.synced
    }

    fn request_sync(&mut self, node: NodeAddress) -> Result<(), CommandError> {
        self.refusal()?;
        self.commands.push(Command::Sync(node)).unwrap();
        Ok(())
    }
}

/// Keeps every report.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub reports: Vec<JobReport, 64>,
    pub resources: Vec<ResourceDebug, 256>,
}

impl RecordingSink {
    pub fn codes(&self) -> Vec<ResultCode, 64> {
        self.reports.iter().map(|r| r.result.code).collect()
    }

    pub fn take(&mut self) -> Vec<JobReport, 64> {
        core::mem::take(&mut self.reports)
    }
}

impl ReportSink for RecordingSink {
    fn report(&mut self, report: &JobReport) {
        self.reports.push(*report).unwrap();
    }

    fn resource_debug(&mut self, notice: &ResourceDebug) {
        self.resources.push(*notice).unwrap();
    }
}

/// Descriptors and lists shared by the tests.
///
/// - `a`: output MOST socket, streaming port
/// - `b`: streaming port, combiner fed by the MOST socket of `a`
/// - `c`: streaming port, streaming socket, input MOST socket, sync connection
/// - `d`: default MediaLB port, MediaLB socket
#[derive(Debug)]
pub struct Scenario {
    pub catalog: Catalog,
    pub most_out: ResourceId,
    pub stream_port: ResourceId,
    pub combiner: ResourceId,
    pub stream_socket: ResourceId,
    pub most_in: ResourceId,
    pub sync_connection: ResourceId,
    pub mlb_socket: ResourceId,
    pub a: ListId,
    pub b: ListId,
    pub c: ListId,
    pub d: ListId,
}

impl Default for Scenario {
    fn default() -> Self {
        let mut builder = Catalog::builder();
        let most_out = builder
            .resource(ResourceObject::MostSocket(MostSocket {
                most_port_handle: ResourceHandle(0x0D00),
                direction: SocketDirection::Output,
                data_type: SocketDataType::Sync,
                bandwidth: 4,
            }))
            .unwrap();
        let stream_port = builder
            .resource(ResourceObject::StreamPort(StreamPort {
                index: 0,
                clock_config: StreamClockConfig::Fs64,
                data_alignment: StreamAlignment::Left16Bit,
            }))
            .unwrap();
        let combiner = builder
            .resource(ResourceObject::Combiner(Combiner {
                port_socket: most_out,
                most_port_handle: ResourceHandle(0x0D00),
                bytes_per_frame: 8,
            }))
            .unwrap();
        let stream_socket = builder
            .resource(ResourceObject::StreamSocket(StreamSocket {
                port: stream_port,
                direction: SocketDirection::Output,
                data_type: SocketDataType::Sync,
                bandwidth: 4,
                stream_pin_id: StreamPinId::SrxA1,
            }))
            .unwrap();
        let most_in = builder
            .resource(ResourceObject::MostSocket(MostSocket {
                most_port_handle: ResourceHandle(0x0D00),
                direction: SocketDirection::Input,
                data_type: SocketDataType::Sync,
                bandwidth: 4,
            }))
            .unwrap();
        let sync_connection = builder
            .resource(ResourceObject::SyncConnection(SyncConnection {
                socket_in: most_in,
                socket_out: stream_socket,
                mute_mode: MuteMode::NoMuting,
                offset: 0,
            }))
            .unwrap();
        let mlb_port = builder
            .resource(ResourceObject::DefaultCreatedPort(DefaultCreatedPort {
                port_type: PortType::Mlb,
                index: 0,
            }))
            .unwrap();
        let mlb_socket = builder
            .resource(ResourceObject::MlbSocket(MlbSocket {
                port: mlb_port,
                direction: SocketDirection::Input,
                data_type: SocketDataType::Isoc,
                bandwidth: 188,
                channel_address: 0x0A,
            }))
            .unwrap();
        let a = builder.list(&[most_out, stream_port]).unwrap();
        let b = builder.list(&[stream_port, combiner]).unwrap();
        let c = builder
            .list(&[stream_port, stream_socket, most_in, sync_connection])
            .unwrap();
        let d = builder.list(&[mlb_port, mlb_socket]).unwrap();
        Self {
            catalog: builder.build(),
            most_out,
            stream_port,
            combiner,
            stream_socket,
            most_in,
            sync_connection,
            mlb_socket,
            a,
            b,
            c,
            d,
        }
    }
}

/// Configuration with [`NODE`] and a 100 ms command timeout.
pub fn config() -> StackConfig {
    StackConfig::builder()
        .device(NODE)
        .unwrap()
        .command_timeout(Duration::from_millis(100))
        .unwrap()
        .build()
        .unwrap()
}

pub fn runtime<'a>(catalog: &'a Catalog, cfg: &StackConfig) -> TestRuntime<'a> {
    Runtime::new(cfg, catalog, MockController::default(), RecordingSink::default()).unwrap()
}

/// Runs `rt` at `now` and answers every command successfully until no work
/// is left. Returns the number of answered commands.
pub fn settle(rt: &mut TestRuntime<'_>, now: Duration) -> usize {
    let mut answered = 0;
    loop {
        _ = rt.run_until_idle(now, 32);
        let Some(command) = rt.controller_mut().next_unanswered() else {
            return answered;
        };
        answered += 1;
        match command {
            Command::Create {
                node,
                allocates_label,
                ..
            } => {
                let handle = rt.controller_mut().allocate();
                let connection_label = allocates_label.then_some(LABEL);
                rt.complete_create(
                    node,
                    Ok(CreateResponse {
                        handle,
                        connection_label,
                    }),
                );
            }
            Command::Destroy { node, .. } => rt.complete_destroy(node, Ok(())),
            Command::Sync(node) => {
                rt.controller_mut().synced = true;
                rt.complete_sync(node, Ok(()));
            }
        }
    }
}
