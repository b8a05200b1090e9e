use crate::{resource::NodeAddress, scheduler::Priority};
use core::{
    fmt::{Display, Formatter},
    time::Duration,
};
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of services known to one scheduler.
pub const MAX_SERVICES: usize = 16;

/// Maximum number of software timers.
pub const MAX_TIMERS: usize = 16;

/// Maximum number of devices a runtime manages.
pub const MAX_DEVICES: usize = 8;

/// Maximum number of handles sent in one destroy command.
pub const DESTROY_BATCH_CAPACITY: usize = 10;

/// Maximum number of handles carried by one auto-destroy notice.
pub const MAX_NOTICE_HANDLES: usize = 16;

/// Runtime configuration of the control plane.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Priority of the resource manager services
    pub service_priority: Priority,

    /// Time a device has to answer a command
    pub command_timeout: Duration,

    /// Maximum number of handles per destroy command
    pub destroy_batch: u8,

    /// Devices, each served by its own resource manager
    pub devices: Vec<NodeAddress, MAX_DEVICES>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            service_priority: Priority(4),
            command_timeout: Duration::from_secs(1),
            destroy_batch: DESTROY_BATCH_CAPACITY as u8,
            devices: Vec::new(),
        }
    }
}

impl StackConfig {
    /// Creates a new builder for a configuration.
    pub fn builder() -> StackConfigBuilder {
        StackConfigBuilder::default()
    }

    /// Checks a configuration that was not created by a builder.
    ///
    /// # Errors
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), StackConfigError> {
        if self.command_timeout.is_zero() {
            return Err(StackConfigError::Timeout);
        }
        if self.destroy_batch == 0 || self.destroy_batch as usize > DESTROY_BATCH_CAPACITY {
            return Err(StackConfigError::DestroyBatch);
        }
        for (i, d) in self.devices.iter().enumerate() {
            if self.devices[..i].contains(d) {
                return Err(StackConfigError::Device);
            }
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackConfigError {
    /// A device is listed twice.
    Device,
    /// The command timeout is zero.
    Timeout,
    /// The destroy batch size is zero or exceeds [`DESTROY_BATCH_CAPACITY`].
    DestroyBatch,
    /// Insufficient storage for configuration
    Storage,
}

impl Display for StackConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Device => write!(f, "Device is configured twice"),
            Self::Timeout => write!(f, "Command timeout must not be zero"),
            Self::DestroyBatch => write!(
                f,
                "Destroy batch must hold between 1 and {DESTROY_BATCH_CAPACITY} handles"
            ),
            Self::Storage => write!(f, "Insufficient storage for configuration"),
        }
    }
}

/// Config builder
#[derive(Debug, Default, Clone)]
pub struct StackConfigBuilder {
    cfg: StackConfig,
}

/// Result of applying a change to the configuration builder.
pub type BuilderResult<'a> = Result<&'a mut StackConfigBuilder, StackConfigError>;

impl StackConfigBuilder {
    /// Build the configuration.
    pub fn build(&self) -> Result<StackConfig, StackConfigError> {
        self.cfg.validate()?;
        Ok(self.cfg.clone())
    }

    /// Adds a device.
    ///
    /// # Errors
    /// Returns an error if the device is already configured or the storage is
    /// insufficient.
    pub fn device(&mut self, node: NodeAddress) -> BuilderResult<'_> {
        if self.cfg.devices.contains(&node) {
            return Err(StackConfigError::Device);
        }
        self.cfg
            .devices
            .push(node)
            .or(Err(StackConfigError::Storage))?;
        Ok(self)
    }

    /// Sets the priority of the resource manager services.
    pub fn priority(&mut self, priority: Priority) -> &mut Self {
        self.cfg.service_priority = priority;
        self
    }

    /// Sets the time a device has to answer a command.
    ///
    /// # Errors
    /// Returns an error if `timeout` is zero.
    pub fn command_timeout(&mut self, timeout: Duration) -> BuilderResult<'_> {
        if timeout.is_zero() {
            return Err(StackConfigError::Timeout);
        }
        self.cfg.command_timeout = timeout;
        Ok(self)
    }

    /// Sets the maximum number of handles per destroy command.
    ///
    /// # Errors
    /// Returns an error if `handles` is zero or exceeds
    /// [`DESTROY_BATCH_CAPACITY`].
    pub fn destroy_batch(&mut self, handles: u8) -> BuilderResult<'_> {
        if handles == 0 || handles as usize > DESTROY_BATCH_CAPACITY {
            return Err(StackConfigError::DestroyBatch);
        }
        self.cfg.destroy_batch = handles;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_checks_every_step() {
        let mut b = StackConfig::builder();
        _ = b.device(NodeAddress(0x100)).unwrap();
        assert_eq!(
            b.device(NodeAddress(0x100)).err(),
            Some(StackConfigError::Device)
        );
        assert_eq!(
            b.command_timeout(Duration::ZERO).err(),
            Some(StackConfigError::Timeout)
        );
        assert_eq!(b.destroy_batch(0).err(), Some(StackConfigError::DestroyBatch));
        assert_eq!(
            b.destroy_batch(DESTROY_BATCH_CAPACITY as u8 + 1).err(),
            Some(StackConfigError::DestroyBatch)
        );
        let cfg = b
            .priority(Priority(2))
            .destroy_batch(3)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(cfg.destroy_batch, 3);
        assert_eq!(cfg.service_priority, Priority(2));
        assert_eq!(cfg.devices.as_slice(), &[NodeAddress(0x100)]);
    }

    #[test]
    fn devices_are_bounded() {
        let mut b = StackConfig::builder();
        for i in 0..MAX_DEVICES as u16 {
            _ = b.device(NodeAddress(i)).unwrap();
        }
        assert_eq!(
            b.device(NodeAddress(0xFFF)).err(),
            Some(StackConfigError::Storage)
        );
    }

    #[test]
    fn validate_rejects_hand_written_config() {
        let cfg = StackConfig {
            destroy_batch: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(StackConfigError::DestroyBatch));
        assert_eq!(StackConfig::default().validate(), Ok(()));
    }
}
