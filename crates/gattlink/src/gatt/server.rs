//! Server role: service registration, advertising, and request
//! handling.

use crate::error::{GattError, GattResult};
use crate::event::Event;
use crate::gap::{AddressType, BdAddr};
use crate::gatt::engine::GattEngine;
use crate::gatt::types::ServiceDefinition;
use crate::transport::pdu::{Pdu, STATUS_INVALID_HANDLE, STATUS_SUCCESS, STATUS_WRITE_NOT_PERMITTED};
use log::{debug, info, warn};

impl GattEngine {
    /// Register services, returning the assigned value handles grouped
    /// per service. Must happen before the first `advertise`.
    pub fn register_services(
        &mut self,
        services: &[ServiceDefinition],
    ) -> GattResult<Vec<Vec<u16>>> {
        let groups = self.store.register_services(services)?;
        info!(
            "registered {} service(s), {} characteristic(s)",
            services.len(),
            groups.iter().map(Vec::len).sum::<usize>()
        );
        Ok(groups)
    }

    /// Replace the value buffer behind a writable characteristic.
    pub fn configure_buffer(&mut self, handle: u16, capacity: usize, append: bool) -> GattResult<()> {
        self.store.configure_buffer(handle, capacity, append)
    }

    /// Start advertising, freezing the service table. Connect requests
    /// are only honored while advertising.
    pub fn advertise(&mut self, interval_us: u32, payload: &[u8]) {
        self.advertising = true;
        self.adv_interval_us = interval_us;
        self.adv_payload = payload.to_vec();
        self.store.activate();
        info!("advertising every {interval_us}us");
    }

    pub fn stop_advertising(&mut self) {
        self.advertising = false;
    }

    /// Drain the buffered value of a local characteristic.
    pub fn read_value(&mut self, handle: u16) -> GattResult<Vec<u8>> {
        self.store.read_value(handle)
    }

    /// Push a notification to a connected central. The handle must
    /// belong to a characteristic with the notify property.
    pub fn notify(&mut self, conn: u16, handle: u16, value: &[u8]) -> GattResult<()> {
        let properties = self
            .store
            .characteristic(handle)
            .ok_or(GattError::InvalidHandle(handle))?
            .properties;
        if !properties.can_notify() {
            return Err(GattError::NotPermitted);
        }
        if !self.connections.is_established(conn) {
            return Err(GattError::NotConnected);
        }
        self.send(&Pdu::Notify {
            conn,
            handle,
            value: value.to_vec(),
        })
    }

    pub(crate) fn handle_connect_req(&mut self, addr_type: AddressType, addr: BdAddr) {
        if !self.advertising {
            debug!("ignoring connect request from {addr} while not advertising");
            return;
        }
        let Some(conn) = self.connections.accept(addr_type, addr) else {
            debug!("ignoring connect request from already-linked peer {addr}");
            return;
        };
        let (own_type, own_addr) = self.address();
        if let Err(err) = self.send(&Pdu::ConnectRsp {
            conn,
            addr_type: own_type,
            addr: own_addr,
        }) {
            warn!("conn {conn}: connect response failed: {err}");
            self.connections.remove(conn);
            return;
        }
        self.bus.emit(&Event::CentralConnect {
            conn,
            addr_type,
            addr,
        });
    }

    pub(crate) fn handle_discover_services_req(
        &mut self,
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    ) {
        if !self.connections.is_established(conn) {
            return;
        }
        let responses: Vec<Pdu> = self
            .store
            .services_in_range(start_handle, end_handle)
            .map(|service| Pdu::DiscoverServicesRsp {
                conn,
                start_handle: service.decl_handle,
                end_handle: service.end_handle,
                uuid: service.uuid.clone(),
            })
            .collect();
        for response in &responses {
            if let Err(err) = self.send(response) {
                warn!("conn {conn}: service discovery response failed: {err}");
                return;
            }
        }
    }

    pub(crate) fn handle_discover_chars_req(
        &mut self,
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    ) {
        if !self.connections.is_established(conn) {
            return;
        }
        let responses: Vec<Pdu> = self
            .store
            .characteristics_in_range(start_handle, end_handle)
            .map(|record| Pdu::DiscoverCharsRsp {
                conn,
                decl_handle: record.decl_handle,
                value_handle: record.value_handle,
                properties: record.properties.bits(),
                uuid: record.uuid.clone(),
            })
            .collect();
        for response in &responses {
            if let Err(err) = self.send(response) {
                warn!("conn {conn}: characteristic discovery response failed: {err}");
                return;
            }
        }
    }

    pub(crate) fn handle_read_req(&mut self, conn: u16, handle: u16) {
        if !self.connections.is_established(conn) {
            return;
        }
        match self.store.read_value(handle) {
            Ok(value) => {
                if let Err(err) = self.send(&Pdu::ReadRsp {
                    conn,
                    handle,
                    value,
                }) {
                    warn!("conn {conn}: read response failed: {err}");
                }
            }
            Err(err) => warn!("conn {conn}: read of handle {handle:#06x} refused: {err}"),
        }
    }

    pub(crate) fn handle_write_cmd(&mut self, conn: u16, handle: u16, value: &[u8]) {
        if !self.connections.is_established(conn) {
            return;
        }
        match self.store.apply_write(handle, value) {
            Ok(applied) => {
                debug!(
                    "conn {conn}: wrote {applied}/{} byte(s) to {handle:#06x}: {}",
                    value.len(),
                    hex::encode(value)
                );
                self.bus.emit(&Event::AttributeWrite { conn, handle });
            }
            Err(err) => warn!("conn {conn}: write to {handle:#06x} refused: {err}"),
        }
    }

    pub(crate) fn handle_write_req(&mut self, conn: u16, txid: u32, handle: u16, value: &[u8]) {
        if !self.connections.is_established(conn) {
            return;
        }
        let result = self.store.apply_write(handle, value);
        let status = match &result {
            Ok(_) => STATUS_SUCCESS,
            Err(GattError::InvalidHandle(_)) => STATUS_INVALID_HANDLE,
            Err(_) => STATUS_WRITE_NOT_PERMITTED,
        };
        if let Err(err) = self.send(&Pdu::WriteRsp { conn, txid, status }) {
            warn!("conn {conn}: write response failed: {err}");
            return;
        }
        if result.is_ok() {
            self.bus.emit(&Event::AttributeWrite { conn, handle });
        }
    }
}
