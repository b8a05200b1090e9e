//! Boundary to the network interface controller.
//!
//! Commands leave through the [`Controller`] trait and return immediately;
//! their results come back later and are fanned out to the waiting resource
//! manager through the subjects of [`CommandChannels`].

use crate::{
    config::{MAX_DEVICES, MAX_NOTICE_HANDLES},
    resource::*,
    scheduler::EventMask,
    subject::{MaskedSubject, SingleSubject, Subject},
};
use core::fmt::{Display, Formatter};
use heapless::Vec;

/// A create command with the handles of the resources it depends on already
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateCommand<'a> {
    /// MOST socket. `label` is the connection to attach input sockets to.
    MostSocket {
        /// Descriptor
        socket: &'a MostSocket,
        /// Connection label of the job
        label: ConnectionLabel,
    },
    /// MediaLB port
    MlbPort(&'a MlbPort),
    /// MediaLB socket
    MlbSocket {
        /// Descriptor
        socket: &'a MlbSocket,
        /// Handle of the MediaLB port
        port: ResourceHandle,
    },
    /// USB port
    UsbPort(&'a UsbPort),
    /// USB socket
    UsbSocket {
        /// Descriptor
        socket: &'a UsbSocket,
        /// Handle of the USB port
        port: ResourceHandle,
    },
    /// RMCK port
    RmckPort(&'a RmckPort),
    /// Streaming port
    StreamPort(&'a StreamPort),
    /// Streaming socket
    StreamSocket {
        /// Descriptor
        socket: &'a StreamSocket,
        /// Handle of the streaming port
        port: ResourceHandle,
    },
    /// Synchronous connection
    SyncConnection {
        /// Descriptor
        connection: &'a SyncConnection,
        /// Handle of the input socket
        socket_in: ResourceHandle,
        /// Handle of the output socket
        socket_out: ResourceHandle,
    },
    /// DFI phase connection
    DfiPhaseConnection {
        /// Descriptor
        connection: &'a DfiPhaseConnection,
        /// Handle of the input socket
        socket_in: ResourceHandle,
        /// Handle of the output socket
        socket_out: ResourceHandle,
    },
    /// Combiner
    Combiner {
        /// Descriptor
        combiner: &'a Combiner,
        /// Handle of the feeding socket
        port_socket: ResourceHandle,
    },
    /// Splitter
    Splitter {
        /// Descriptor
        splitter: &'a Splitter,
        /// Handle of the socket to split
        socket_in: ResourceHandle,
    },
    /// A/V packetized connection
    AvpConnection {
        /// Descriptor
        connection: &'a AvpConnection,
        /// Handle of the input socket
        socket_in: ResourceHandle,
        /// Handle of the output socket
        socket_out: ResourceHandle,
    },
    /// QoS IP connection
    QosConnection {
        /// Descriptor
        connection: &'a QosConnection,
        /// Handle of the input socket
        socket_in: ResourceHandle,
        /// Handle of the output socket
        socket_out: ResourceHandle,
    },
}

impl CreateCommand<'_> {
    /// Kind of the resource to create.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::MostSocket { .. } => ResourceType::MostSocket,
            Self::MlbPort(_) => ResourceType::MlbPort,
            Self::MlbSocket { .. } => ResourceType::MlbSocket,
            Self::UsbPort(_) => ResourceType::UsbPort,
            Self::UsbSocket { .. } => ResourceType::UsbSocket,
            Self::RmckPort(_) => ResourceType::RmckPort,
            Self::StreamPort(_) => ResourceType::StreamPort,
            Self::StreamSocket { .. } => ResourceType::StreamSocket,
            Self::SyncConnection { .. } => ResourceType::SyncConnection,
            Self::DfiPhaseConnection { .. } => ResourceType::DfiPhaseConnection,
            Self::Combiner { .. } => ResourceType::Combiner,
            Self::Splitter { .. } => ResourceType::Splitter,
            Self::AvpConnection { .. } => ResourceType::AvpConnection,
            Self::QosConnection { .. } => ResourceType::QosConnection,
        }
    }
}

/// Command access to the controllers of all devices.
///
/// Every method only queues a command. Results are passed back through
/// [`crate::prelude::Runtime`].
pub trait Controller {
    /// Requests creation of a resource on `node`.
    fn create_resource(
        &mut self,
        node: NodeAddress,
        command: CreateCommand<'_>,
    ) -> Result<(), CommandError>;

    /// Requests destruction of `handles` on `node`, in the given order.
    fn destroy_resources(
        &mut self,
        node: NodeAddress,
        handles: &[ResourceHandle],
    ) -> Result<(), CommandError>;

    /// Whether the remote controller of `node` is attached.
    fn is_synced(&self, node: NodeAddress) -> bool;

    /// Requests attachment of the remote controller of `node`.
    fn request_sync(&mut self, node: NodeAddress) -> Result<(), CommandError>;
}

/// A command could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// No transmit buffer is free. Retry after a buffer became available.
    BufferOverflow,
    /// The controller is not available.
    NotAvailable,
    /// The command was malformed.
    InvalidParameter,
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferOverflow => write!(f, "No transmit buffer available"),
            Self::NotAvailable => write!(f, "Controller not available"),
            Self::InvalidParameter => write!(f, "Invalid command parameter"),
        }
    }
}

/// A device answered a command with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// At least one handle of a destroy command was unknown to the device.
    HandleNotFound,
    /// The device refused a destroy command starting at the handle with
    /// index `refused_at`. The handles before it were destroyed.
    Busy {
        /// Index of the first handle that was not destroyed.
        refused_at: usize,
    },
    /// The device rejected the command.
    Rejected {
        /// Error code of the device
        code: u8,
    },
    /// The device did not answer in time.
    Timeout,
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::HandleNotFound => write!(f, "Handle not found"),
            Self::Busy { refused_at } => write!(f, "Device busy at handle {refused_at}"),
            Self::Rejected { code } => write!(f, "Rejected with code {code:#04x}"),
            Self::Timeout => write!(f, "No answer from device"),
        }
    }
}

/// Successful answer to a create command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateResponse {
    /// Handle of the new resource
    pub handle: ResourceHandle,
    /// Connection label allocated for an output MOST socket
    pub connection_label: Option<ConnectionLabel>,
}

/// Answer to a create command.
pub type CreateResult = Result<CreateResponse, DeviceError>;

/// Answer to a destroy command.
pub type DestroyResult = Result<(), DeviceError>;

/// Answer to a sync request.
pub type SyncResult = Result<(), DeviceError>;

/// The remote controller of a device lost its attachment.
pub const NOTICE_SYNC_LOST: EventMask = 1 << 0;
/// The network went down.
pub const NOTICE_NETWORK_NOT_AVAILABLE: EventMask = 1 << 1;
/// A device destroyed resources on its own.
pub const NOTICE_RESOURCES_DESTROYED: EventMask = 1 << 2;
/// Every device notice.
pub const NOTICE_ALL: EventMask =
    NOTICE_SYNC_LOST | NOTICE_NETWORK_NOT_AVAILABLE | NOTICE_RESOURCES_DESTROYED;

/// Unsolicited device status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceNotice {
    /// The remote controller of `node` lost its attachment.
    SyncLost(NodeAddress),
    /// The network is not available. Affects every device.
    NetworkNotAvailable,
    /// `node` destroyed `handles` without being asked to.
    ResourcesDestroyed {
        /// Device
        node: NodeAddress,
        /// Destroyed resources
        handles: Vec<ResourceHandle, MAX_NOTICE_HANDLES>,
    },
}

impl DeviceNotice {
    /// Event bit of this notice.
    pub fn mask(&self) -> EventMask {
        match self {
            Self::SyncLost(_) => NOTICE_SYNC_LOST,
            Self::NetworkNotAvailable => NOTICE_NETWORK_NOT_AVAILABLE,
            Self::ResourcesDestroyed { .. } => NOTICE_RESOURCES_DESTROYED,
        }
    }
}

/// Observer identity of a resource manager, the index of its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Waiter(pub u8);

/// Result subjects of one device. A device runs one command of each kind at
/// a time, so each subject holds at most one waiter.
#[derive(Debug, Default)]
pub struct DeviceChannel {
    /// Device
    pub node: NodeAddress,
    /// Waiter for a create result
    pub create: SingleSubject<Waiter>,
    /// Waiter for a destroy result
    pub destroy: SingleSubject<Waiter>,
    /// Waiter for a sync result
    pub sync: SingleSubject<Waiter>,
}

/// Every subject a resource manager may wait on.
#[derive(Debug, Default)]
pub struct CommandChannels {
    devices: Vec<DeviceChannel, MAX_DEVICES>,
    buffer_available: Subject<Waiter, MAX_DEVICES>,
    notices: MaskedSubject<Waiter, MAX_DEVICES>,
}

impl CommandChannels {
    /// Creates channels without devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the channel of `node` and returns the waiter serving it.
    ///
    /// # Errors
    /// Returns the rejected address if all device slots are in use.
    pub fn add_device(&mut self, node: NodeAddress) -> Result<Waiter, NodeAddress> {
        let waiter = Waiter(self.devices.len() as u8);
        self.devices
            .push(DeviceChannel {
                node,
                ..Default::default()
            })
            .map_err(|c| c.node)?;
        Ok(waiter)
    }

    /// Channel served by `waiter`.
    pub fn device(&self, waiter: Waiter) -> Option<&DeviceChannel> {
        self.devices.get(waiter.0 as usize)
    }

    /// Channel of `node`.
    pub fn device_by_node(&self, node: NodeAddress) -> Option<&DeviceChannel> {
        self.devices.iter().find(|d| d.node == node)
    }

    /// Waiters for a free transmit buffer.
    pub fn buffer_available(&self) -> &Subject<Waiter, MAX_DEVICES> {
        &self.buffer_available
    }

    /// Receivers of device notices.
    pub fn notices(&self) -> &MaskedSubject<Waiter, MAX_DEVICES> {
        &self.notices
    }
}
