//! Resource descriptors and the catalog of resource lists.
//!
//! A descriptor says how one controller resource (port, socket or
//! connection) is created. Descriptors refer to each other by [`ResourceId`],
//! and a resource list, identified by [`ListId`], is the ordered set of
//! descriptors one job builds. Two lists containing the same [`ResourceId`]
//! share that resource on the controller.

use core::fmt::{Display, Formatter};
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a descriptor inside a catalog.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u16);

/// Index of a resource list inside a catalog. A job is identified by the list
/// it builds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListId(pub u16);

/// Identifier the controller assigns to a created resource.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u16);

impl ResourceHandle {
    /// Marks the absence of a handle.
    pub const INVALID: Self = Self(0xFFFF);

    /// Whether this is a handle the controller may have assigned.
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Label of a connection on the MOST network.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionLabel(pub u16);

/// Address of a device on the network.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress(pub u16);

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl Display for ConnectionLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Kind of a descriptor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Socket on the MOST network port.
    MostSocket,
    /// MediaLB port.
    MlbPort,
    /// MediaLB socket.
    MlbSocket,
    /// USB port.
    UsbPort,
    /// USB socket.
    UsbSocket,
    /// RMCK clock output port.
    RmckPort,
    /// Streaming port.
    StreamPort,
    /// Streaming socket.
    StreamSocket,
    /// Synchronous connection between two sockets.
    SyncConnection,
    /// DFI phase connection between two sockets.
    DfiPhaseConnection,
    /// Combiner of several streams into one network socket.
    Combiner,
    /// Splitter of one network socket into several streams.
    Splitter,
    /// A/V packetized connection between two sockets.
    AvpConnection,
    /// Quality-of-service IP connection between two sockets.
    QosConnection,
    /// Port that always exists on the controller.
    DefaultCreatedPort,
}

/// Direction of a socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketDirection {
    /// Data flows into the controller.
    Input,
    /// Data flows out of the controller.
    Output,
}

/// Data carried by a socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketDataType {
    /// Synchronous stream data.
    Sync,
    /// Isochronous data.
    Isoc,
    /// A/V packetized data.
    AvPacketized,
    /// Quality-of-service IP packets.
    QosIp,
    /// DFI phase data.
    DfiPhase,
}

/// Clock of a MediaLB port in multiples of the frame rate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlbClockConfig {
    /// 256 Fs
    Fs256,
    /// 512 Fs
    Fs512,
    /// 1024 Fs
    Fs1024,
    /// 2048 Fs
    Fs2048,
    /// 3072 Fs
    Fs3072,
    /// 4096 Fs
    Fs4096,
    /// 6144 Fs
    Fs6144,
    /// 8192 Fs
    Fs8192,
}

/// Clock of a streaming port in multiples of the frame rate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClockConfig {
    /// 8 Fs
    Fs8,
    /// 16 Fs
    Fs16,
    /// 32 Fs
    Fs32,
    /// 64 Fs
    Fs64,
    /// 128 Fs
    Fs128,
    /// 256 Fs
    Fs256,
    /// 512 Fs
    Fs512,
    /// Clock configured by another port.
    Wildcard,
}

/// Alignment of samples on a streaming port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAlignment {
    /// Left justified, 16 bit
    Left16Bit,
    /// Left justified, 24 bit
    Left24Bit,
    /// Right justified, 16 bit
    Right16Bit,
    /// Right justified, 24 bit
    Right24Bit,
    /// Sequential
    Sequential,
}

/// Pin of a streaming socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPinId {
    /// Port A, pin SR0
    SrxA0,
    /// Port A, pin SR1
    SrxA1,
    /// Port B, pin SR0
    SrxB0,
    /// Port B, pin SR1
    SrxB1,
}

/// Clock source of the RMCK port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmckClockSource {
    /// Derived from streaming port 0.
    StreamPort0,
    /// Derived from streaming port 1.
    StreamPort1,
    /// Derived from the network frame rate.
    Network,
}

/// Physical layer of a USB port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbPhysicalLayer {
    /// Standard USB
    Standard,
    /// High-speed inter-chip
    Hsic,
}

/// Mute behaviour of a synchronous connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteMode {
    /// Never muted.
    NoMuting,
    /// Muted by the controller's mute signal.
    MuteSignal,
}

/// Packet size of an A/V packetized connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsocPacketSize {
    /// 188 bytes
    Bytes188,
    /// 196 bytes
    Bytes196,
    /// 206 bytes
    Bytes206,
}

/// Type of a port that always exists on the controller.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// MediaLB port
    Mlb,
    /// USB port
    Usb,
    /// Streaming port
    Stream,
}

impl PortType {
    const fn code(self) -> u16 {
        match self {
            PortType::Mlb => 0x0A,
            PortType::Usb => 0x12,
            PortType::Stream => 0x16,
        }
    }
}

/// MOST network socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MostSocket {
    /// Handle of the network port the socket is created on.
    pub most_port_handle: ResourceHandle,
    /// Direction
    pub direction: SocketDirection,
    /// Data type
    pub data_type: SocketDataType,
    /// Bandwidth in bytes per frame
    pub bandwidth: u16,
}

/// MediaLB port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlbPort {
    /// Port instance
    pub index: u8,
    /// Port clock
    pub clock_config: MlbClockConfig,
}

/// MediaLB socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlbSocket {
    /// MediaLB port the socket belongs to.
    pub port: ResourceId,
    /// Direction
    pub direction: SocketDirection,
    /// Data type
    pub data_type: SocketDataType,
    /// Bandwidth in bytes per frame
    pub bandwidth: u16,
    /// MediaLB channel address
    pub channel_address: u16,
}

/// USB port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPort {
    /// Port instance
    pub index: u8,
    /// Physical layer
    pub physical_layer: UsbPhysicalLayer,
    /// Enabled device interfaces bitmask
    pub devices_interfaces: u16,
    /// OUT endpoint of the streaming interface
    pub streaming_if_ep_out_addr: u8,
    /// IN endpoint of the streaming interface
    pub streaming_if_ep_in_addr: u8,
}

/// USB socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbSocket {
    /// USB port the socket belongs to.
    pub port: ResourceId,
    /// Direction
    pub direction: SocketDirection,
    /// Data type
    pub data_type: SocketDataType,
    /// USB endpoint address
    pub end_point_addr: u8,
    /// Frames per USB transfer
    pub frames_per_transfer: u16,
}

/// RMCK port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmckPort {
    /// Port instance
    pub index: u8,
    /// Clock source
    pub clock_source: RmckClockSource,
    /// Divisor of the clock source
    pub divisor: u16,
}

/// Streaming port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPort {
    /// Port instance
    pub index: u8,
    /// Port clock
    pub clock_config: StreamClockConfig,
    /// Sample alignment
    pub data_alignment: StreamAlignment,
}

/// Streaming socket.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSocket {
    /// Streaming port the socket belongs to.
    pub port: ResourceId,
    /// Direction
    pub direction: SocketDirection,
    /// Data type
    pub data_type: SocketDataType,
    /// Bandwidth in bytes per frame
    pub bandwidth: u16,
    /// Serial pin
    pub stream_pin_id: StreamPinId,
}

/// Synchronous connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConnection {
    /// Input socket
    pub socket_in: ResourceId,
    /// Output socket
    pub socket_out: ResourceId,
    /// Mute mode
    pub mute_mode: MuteMode,
    /// Byte offset into the input socket
    pub offset: u16,
}

/// DFI phase connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfiPhaseConnection {
    /// Input socket
    pub socket_in: ResourceId,
    /// Output socket
    pub socket_out: ResourceId,
}

/// Combiner.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combiner {
    /// Socket feeding the combiner.
    pub port_socket: ResourceId,
    /// Network port the combiner writes to.
    pub most_port_handle: ResourceHandle,
    /// Bytes per frame
    pub bytes_per_frame: u16,
}

/// Splitter.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splitter {
    /// Socket the splitter reads from.
    pub socket_in: ResourceId,
    /// Network port the splitter is attached to.
    pub most_port_handle: ResourceHandle,
    /// Bytes per frame
    pub bytes_per_frame: u16,
}

/// A/V packetized connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvpConnection {
    /// Input socket
    pub socket_in: ResourceId,
    /// Output socket
    pub socket_out: ResourceId,
    /// Packet size
    pub isoc_packet_size: IsocPacketSize,
}

/// Quality-of-service IP connection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosConnection {
    /// Input socket
    pub socket_in: ResourceId,
    /// Output socket
    pub socket_out: ResourceId,
}

/// Port that exists without being created. Its handle is derived from its
/// type and index.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCreatedPort {
    /// Port type
    pub port_type: PortType,
    /// Port instance
    pub index: u8,
}

impl DefaultCreatedPort {
    /// Handle under which the controller knows this port.
    pub const fn handle(&self) -> ResourceHandle {
        ResourceHandle((self.port_type.code() << 8) | self.index as u16)
    }
}

/// A resource descriptor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceObject {
    /// MOST socket
    MostSocket(MostSocket),
    /// MediaLB port
    MlbPort(MlbPort),
    /// MediaLB socket
    MlbSocket(MlbSocket),
    /// USB port
    UsbPort(UsbPort),
    /// USB socket
    UsbSocket(UsbSocket),
    /// RMCK port
    RmckPort(RmckPort),
    /// Streaming port
    StreamPort(StreamPort),
    /// Streaming socket
    StreamSocket(StreamSocket),
    /// Synchronous connection
    SyncConnection(SyncConnection),
    /// DFI phase connection
    DfiPhaseConnection(DfiPhaseConnection),
    /// Combiner
    Combiner(Combiner),
    /// Splitter
    Splitter(Splitter),
    /// A/V packetized connection
    AvpConnection(AvpConnection),
    /// QoS IP connection
    QosConnection(QosConnection),
    /// Port that is never created
    DefaultCreatedPort(DefaultCreatedPort),
}

/// What a descriptor reference has to point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Port(PortType),
    Socket,
}

impl RefKind {
    fn matches(self, target: &ResourceObject) -> bool {
        use ResourceObject as R;
        match (self, target) {
            (RefKind::Port(PortType::Mlb), R::MlbPort(_))
            | (RefKind::Port(PortType::Usb), R::UsbPort(_))
            | (RefKind::Port(PortType::Stream), R::StreamPort(_)) => true,
            (RefKind::Port(t), R::DefaultCreatedPort(p)) => p.port_type == t,
            (RefKind::Socket, target) => target.is_socket(),
            _ => false,
        }
    }
}

impl ResourceObject {
    /// Kind of this descriptor.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::MostSocket(_) => ResourceType::MostSocket,
            Self::MlbPort(_) => ResourceType::MlbPort,
            Self::MlbSocket(_) => ResourceType::MlbSocket,
            Self::UsbPort(_) => ResourceType::UsbPort,
            Self::UsbSocket(_) => ResourceType::UsbSocket,
            Self::RmckPort(_) => ResourceType::RmckPort,
            Self::StreamPort(_) => ResourceType::StreamPort,
            Self::StreamSocket(_) => ResourceType::StreamSocket,
            Self::SyncConnection(_) => ResourceType::SyncConnection,
            Self::DfiPhaseConnection(_) => ResourceType::DfiPhaseConnection,
            Self::Combiner(_) => ResourceType::Combiner,
            Self::Splitter(_) => ResourceType::Splitter,
            Self::AvpConnection(_) => ResourceType::AvpConnection,
            Self::QosConnection(_) => ResourceType::QosConnection,
            Self::DefaultCreatedPort(_) => ResourceType::DefaultCreatedPort,
        }
    }

    /// Whether the descriptor is a socket.
    pub fn is_socket(&self) -> bool {
        matches!(
            self,
            Self::MostSocket(_) | Self::MlbSocket(_) | Self::UsbSocket(_) | Self::StreamSocket(_)
        )
    }

    /// Descriptors this one refers to.
    pub fn references(&self) -> impl Iterator<Item = ResourceId> {
        self.typed_references().into_iter().flatten().map(|(id, _)| id)
    }

    fn typed_references(&self) -> [Option<(ResourceId, RefKind)>; 2] {
        let socket = |id: ResourceId| Some((id, RefKind::Socket));
        match self {
            Self::MlbSocket(s) => [Some((s.port, RefKind::Port(PortType::Mlb))), None],
            Self::UsbSocket(s) => [Some((s.port, RefKind::Port(PortType::Usb))), None],
            Self::StreamSocket(s) => [Some((s.port, RefKind::Port(PortType::Stream))), None],
            Self::SyncConnection(c) => [socket(c.socket_in), socket(c.socket_out)],
            Self::DfiPhaseConnection(c) => [socket(c.socket_in), socket(c.socket_out)],
            Self::AvpConnection(c) => [socket(c.socket_in), socket(c.socket_out)],
            Self::QosConnection(c) => [socket(c.socket_in), socket(c.socket_out)],
            Self::Combiner(c) => [socket(c.port_socket), None],
            Self::Splitter(s) => [socket(s.socket_in), None],
            Self::MostSocket(_)
            | Self::MlbPort(_)
            | Self::UsbPort(_)
            | Self::RmckPort(_)
            | Self::StreamPort(_)
            | Self::DefaultCreatedPort(_) => [None, None],
        }
    }
}

/// Read access to descriptors and resource lists.
pub trait ResourceLists {
    /// Descriptor `id`.
    fn resource(&self, id: ResourceId) -> Option<&ResourceObject>;

    /// Resource list `id` in build order.
    fn list(&self, id: ListId) -> Option<&[ResourceId]>;
}

/// Statically sized store of descriptors and resource lists.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResourceCatalog<const RES: usize, const LISTS: usize, const LEN: usize> {
    /// Descriptors indexed by [`ResourceId`].
    #[cfg_attr(feature = "serde", serde(default))]
    pub resources: Vec<ResourceObject, RES>,

    /// Resource lists indexed by [`ListId`].
    #[cfg_attr(feature = "serde", serde(default))]
    pub lists: Vec<Vec<ResourceId, LEN>, LISTS>,
}

impl<const RES: usize, const LISTS: usize, const LEN: usize> ResourceLists
    for ResourceCatalog<RES, LISTS, LEN>
{
    fn resource(&self, id: ResourceId) -> Option<&ResourceObject> {
        self.resources.get(id.0 as usize)
    }

    fn list(&self, id: ListId) -> Option<&[ResourceId]> {
        self.lists.get(id.0 as usize).map(|l| l.as_slice())
    }
}

impl<const RES: usize, const LISTS: usize, const LEN: usize> ResourceCatalog<RES, LISTS, LEN> {
    /// Creates a new builder for a catalog.
    pub fn builder() -> CatalogBuilder<RES, LISTS, LEN> {
        CatalogBuilder::default()
    }

    /// Checks every reference and every list, e.g. after deserializing.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for r in self.resources.iter() {
            self.check_references(r)?;
        }
        for l in self.lists.iter() {
            self.check_list(l)?;
        }
        Ok(())
    }

    fn check_references(&self, object: &ResourceObject) -> Result<(), CatalogError> {
        for (id, kind) in object.typed_references().into_iter().flatten() {
            let target = self.resource(id).ok_or(CatalogError::Resource)?;
            if !kind.matches(target) {
                inic_debug!("{:?} cannot refer to {:?}", object.resource_type(), target.resource_type());
                return Err(CatalogError::Reference);
            }
        }
        Ok(())
    }

    fn check_list(&self, list: &[ResourceId]) -> Result<(), CatalogError> {
        if list.is_empty() {
            return Err(CatalogError::List);
        }
        for (i, id) in list.iter().enumerate() {
            if self.resource(*id).is_none() {
                return Err(CatalogError::Resource);
            }
            if list[..i].contains(id) {
                return Err(CatalogError::List);
            }
        }
        Ok(())
    }
}

/// Catalog builder
#[derive(Debug, Default, Clone)]
pub struct CatalogBuilder<const RES: usize, const LISTS: usize, const LEN: usize> {
    catalog: ResourceCatalog<RES, LISTS, LEN>,
}

impl<const RES: usize, const LISTS: usize, const LEN: usize> CatalogBuilder<RES, LISTS, LEN> {
    /// Adds a descriptor.
    ///
    /// # Errors
    /// Returns an error if a referenced descriptor does not exist or has the
    /// wrong kind, or the storage is insufficient.
    pub fn resource(&mut self, object: ResourceObject) -> Result<ResourceId, CatalogError> {
        self.catalog.check_references(&object)?;
        let id = ResourceId(self.catalog.resources.len() as u16);
        self.catalog
            .resources
            .push(object)
            .or(Err(CatalogError::Storage))?;
        Ok(id)
    }

    /// Adds a resource list.
    ///
    /// # Errors
    /// Returns an error if the list is empty, refers to an unknown descriptor
    /// or contains a descriptor twice, or the storage is insufficient.
    pub fn list(&mut self, resources: &[ResourceId]) -> Result<ListId, CatalogError> {
        self.catalog.check_list(resources)?;
        let list = Vec::from_slice(resources).or(Err(CatalogError::Storage))?;
        let id = ListId(self.catalog.lists.len() as u16);
        self.catalog
            .lists
            .push(list)
            .or(Err(CatalogError::Storage))?;
        Ok(id)
    }

    /// Builds the catalog.
    pub fn build(&self) -> ResourceCatalog<RES, LISTS, LEN> {
        self.catalog.clone()
    }
}

/// Invalid catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Insufficient storage
    Storage,
    /// Reference to a descriptor that does not exist.
    Resource,
    /// Reference to a descriptor of the wrong kind.
    Reference,
    /// The list is empty or contains a descriptor twice.
    List,
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Storage => write!(f, "Insufficient storage for catalog"),
            Self::Resource => write!(f, "Unknown resource"),
            Self::Reference => write!(f, "Resource refers to a resource of the wrong kind"),
            Self::List => write!(f, "Invalid resource list"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_port() -> ResourceObject {
        ResourceObject::StreamPort(StreamPort {
            index: 0,
            clock_config: StreamClockConfig::Fs64,
            data_alignment: StreamAlignment::Left16Bit,
        })
    }

    #[test]
    fn build_catalog() {
        let mut b = ResourceCatalog::<8, 4, 4>::builder();
        let port = b.resource(stream_port()).unwrap();
        let socket = b
            .resource(ResourceObject::StreamSocket(StreamSocket {
                port,
                direction: SocketDirection::Input,
                data_type: SocketDataType::Sync,
                bandwidth: 4,
                stream_pin_id: StreamPinId::SrxA0,
            }))
            .unwrap();
        let list = b.list(&[port, socket]).unwrap();
        let catalog = b.build();
        assert_eq!(catalog.list(list), Some(&[port, socket][..]));
        assert_eq!(
            catalog.resource(socket).map(|r| r.references().next()),
            Some(Some(port))
        );
        assert_eq!(catalog.validate(), Ok(()));
    }

    #[test]
    fn reference_kind_is_checked() {
        let mut b = ResourceCatalog::<8, 4, 4>::builder();
        let port = b.resource(stream_port()).unwrap();
        let mlb_socket = ResourceObject::MlbSocket(MlbSocket {
            port,
            direction: SocketDirection::Output,
            data_type: SocketDataType::Sync,
            bandwidth: 4,
            channel_address: 0x0A,
        });
        assert_eq!(b.resource(mlb_socket), Err(CatalogError::Reference));
        let splitter = ResourceObject::Splitter(Splitter {
            socket_in: ResourceId(7),
            most_port_handle: ResourceHandle(0x0D00),
            bytes_per_frame: 8,
        });
        assert_eq!(b.resource(splitter), Err(CatalogError::Resource));
    }

    #[test]
    fn default_port_satisfies_port_reference() {
        let mut b = ResourceCatalog::<8, 4, 4>::builder();
        let port = b
            .resource(ResourceObject::DefaultCreatedPort(DefaultCreatedPort {
                port_type: PortType::Mlb,
                index: 0,
            }))
            .unwrap();
        let socket = ResourceObject::MlbSocket(MlbSocket {
            port,
            direction: SocketDirection::Input,
            data_type: SocketDataType::Sync,
            bandwidth: 2,
            channel_address: 0x10,
        });
        assert!(b.resource(socket).is_ok());
    }

    #[test]
    fn invalid_lists_are_rejected() {
        let mut b = ResourceCatalog::<4, 1, 2>::builder();
        let port = b.resource(stream_port()).unwrap();
        assert_eq!(b.list(&[]), Err(CatalogError::List));
        assert_eq!(b.list(&[port, port]), Err(CatalogError::List));
        assert_eq!(b.list(&[ResourceId(3)]), Err(CatalogError::Resource));
        assert_eq!(b.list(&[port, port, port]), Err(CatalogError::List));
        _ = b.list(&[port]).unwrap();
        assert_eq!(b.list(&[port]), Err(CatalogError::Storage));
    }

    #[test]
    fn default_port_handle_encodes_type_and_index() {
        let p = DefaultCreatedPort {
            port_type: PortType::Usb,
            index: 1,
        };
        assert_eq!(p.handle(), ResourceHandle(0x1201));
    }
}
