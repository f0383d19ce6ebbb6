//! Common types for GATT operations

use crate::uuid::Uuid;
use bitflags::bitflags;

bitflags! {
    /// Characteristic properties as defined in the Bluetooth
    /// specification. Declares capabilities, not current value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CharacteristicProperty: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
    }
}

impl CharacteristicProperty {
    /// Whether the characteristic accepts writes of either flavor.
    pub fn is_writable(&self) -> bool {
        self.intersects(Self::WRITE | Self::WRITE_WITHOUT_RESPONSE)
    }

    pub fn can_notify(&self) -> bool {
        self.contains(Self::NOTIFY)
    }
}

/// One characteristic in a service definition.
#[derive(Debug, Clone)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub properties: CharacteristicProperty,
}

impl CharacteristicDefinition {
    pub fn new(uuid: Uuid, properties: CharacteristicProperty) -> Self {
        Self { uuid, properties }
    }
}

/// A GATT service definition: a UUID plus its characteristics in
/// declaration order. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDefinition>,
}

impl ServiceDefinition {
    pub fn new(uuid: Uuid, characteristics: Vec<CharacteristicDefinition>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }
}
