//! Server-side attribute store
//!
//! Holds the registered services, their characteristics, and the
//! per-characteristic value buffers. Handles are assigned at
//! registration time, unique within the store, and strictly increasing
//! in declaration order: service declaration handle, then for each
//! characteristic a declaration handle followed by its value handle.

use crate::error::{GattError, GattResult};
use crate::gatt::types::{CharacteristicProperty, ServiceDefinition};
use crate::uuid::Uuid;
use std::collections::BTreeMap;

pub const ATT_HANDLE_MIN: u16 = 0x0001;
pub const ATT_HANDLE_MAX: u16 = 0xFFFF;

/// Buffer capacity every writable characteristic starts with, until
/// reconfigured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 20;

/// Per-characteristic value buffer with a fixed capacity and a write
/// mode.
///
/// In replace mode a write replaces the contents wholesale, truncated
/// to capacity. In append mode a write fills the remaining capacity and
/// silently drops the rest; overflow is never surfaced to the writer,
/// mirroring attribute-protocol behavior where the server may apply a
/// smaller effective length without telling the client. Reads drain the
/// buffer so serial writes can be accumulated and fetched as one unit.
#[derive(Debug)]
pub struct ValueBuffer {
    data: Vec<u8>,
    capacity: usize,
    append: bool,
}

impl ValueBuffer {
    pub fn new(capacity: usize, append: bool) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            append,
        }
    }

    /// Apply a write under the buffer policy. Returns the number of
    /// bytes actually stored.
    pub fn write(&mut self, value: &[u8]) -> usize {
        if self.append {
            let room = self.capacity - self.data.len();
            let applied = value.len().min(room);
            self.data.extend_from_slice(&value[..applied]);
            applied
        } else {
            let applied = value.len().min(self.capacity);
            self.data.clear();
            self.data.extend_from_slice(&value[..applied]);
            applied
        }
    }

    /// Take the current contents, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append_mode(&self) -> bool {
        self.append
    }
}

/// A registered service: declaration handle, group end handle, UUID.
#[derive(Debug)]
pub struct ServiceRecord {
    pub decl_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid,
}

/// A registered characteristic and its value buffer.
#[derive(Debug)]
pub struct CharacteristicRecord {
    pub decl_handle: u16,
    pub value_handle: u16,
    pub uuid: Uuid,
    pub properties: CharacteristicProperty,
    pub buffer: ValueBuffer,
}

/// The server's attribute database.
pub struct AttributeStore {
    services: Vec<ServiceRecord>,
    /// Characteristics keyed by value handle.
    characteristics: BTreeMap<u16, CharacteristicRecord>,
    next_handle: u16,
    active: bool,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            characteristics: BTreeMap::new(),
            next_handle: ATT_HANDLE_MIN,
            active: false,
        }
    }

    fn alloc_handle(&mut self) -> u16 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Register services in declaration order, returning the assigned
    /// value handles grouped per service.
    ///
    /// Fails with `Registration` once the server is active, or when a
    /// characteristic UUID repeats within one service.
    pub fn register_services(
        &mut self,
        services: &[ServiceDefinition],
    ) -> GattResult<Vec<Vec<u16>>> {
        if self.active {
            return Err(GattError::Registration(
                "services cannot be registered while the server is active".into(),
            ));
        }
        for service in services {
            for (i, characteristic) in service.characteristics.iter().enumerate() {
                if service.characteristics[..i]
                    .iter()
                    .any(|other| other.uuid == characteristic.uuid)
                {
                    return Err(GattError::Registration(format!(
                        "duplicate characteristic UUID {} in service {}",
                        characteristic.uuid, service.uuid
                    )));
                }
            }
        }

        let mut groups = Vec::with_capacity(services.len());
        for service in services {
            let decl_handle = self.alloc_handle();
            let mut value_handles = Vec::with_capacity(service.characteristics.len());
            for characteristic in &service.characteristics {
                let char_decl = self.alloc_handle();
                let value_handle = self.alloc_handle();
                self.characteristics.insert(
                    value_handle,
                    CharacteristicRecord {
                        decl_handle: char_decl,
                        value_handle,
                        uuid: characteristic.uuid.clone(),
                        properties: characteristic.properties,
                        buffer: ValueBuffer::new(DEFAULT_BUFFER_CAPACITY, false),
                    },
                );
                value_handles.push(value_handle);
            }
            self.services.push(ServiceRecord {
                decl_handle,
                end_handle: self.next_handle - 1,
                uuid: service.uuid.clone(),
            });
            groups.push(value_handles);
        }
        Ok(groups)
    }

    /// Freeze the service table. Called when the server starts
    /// advertising.
    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Replace a writable characteristic's buffer with one of the given
    /// capacity and write mode. Any buffered contents are discarded.
    ///
    /// Fails with `InvalidHandle` if the handle is unknown or the
    /// characteristic lacks writable flags.
    pub fn configure_buffer(
        &mut self,
        handle: u16,
        capacity: usize,
        append: bool,
    ) -> GattResult<()> {
        let record = self
            .characteristics
            .get_mut(&handle)
            .ok_or(GattError::InvalidHandle(handle))?;
        if !record.properties.is_writable() {
            return Err(GattError::InvalidHandle(handle));
        }
        record.buffer = ValueBuffer::new(capacity, append);
        Ok(())
    }

    /// Apply an inbound write under the buffer policy, returning the
    /// applied length. Overflow is silent truncation, never an error.
    pub fn apply_write(&mut self, handle: u16, value: &[u8]) -> GattResult<usize> {
        let record = self
            .characteristics
            .get_mut(&handle)
            .ok_or(GattError::InvalidHandle(handle))?;
        if !record.properties.is_writable() {
            return Err(GattError::NotPermitted);
        }
        Ok(record.buffer.write(value))
    }

    /// Drain and return the buffer contents for a handle.
    pub fn read_value(&mut self, handle: u16) -> GattResult<Vec<u8>> {
        let record = self
            .characteristics
            .get_mut(&handle)
            .ok_or(GattError::InvalidHandle(handle))?;
        Ok(record.buffer.drain())
    }

    pub fn characteristic(&self, handle: u16) -> Option<&CharacteristicRecord> {
        self.characteristics.get(&handle)
    }

    /// Characteristics whose value handle lies in the range, ascending.
    pub fn characteristics_in_range(
        &self,
        start_handle: u16,
        end_handle: u16,
    ) -> impl Iterator<Item = &CharacteristicRecord> {
        self.characteristics
            .range(start_handle..=end_handle)
            .map(|(_, record)| record)
    }

    /// Services whose declaration handle lies in the range, ascending.
    pub fn services_in_range(
        &self,
        start_handle: u16,
        end_handle: u16,
    ) -> impl Iterator<Item = &ServiceRecord> {
        self.services
            .iter()
            .filter(move |s| s.decl_handle >= start_handle && s.decl_handle <= end_handle)
    }
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new()
    }
}
