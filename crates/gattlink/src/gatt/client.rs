//! Client role: connecting, discovery, reads, and writes.

use crate::conn::ConnectionState;
use crate::error::{GattError, GattResult};
use crate::event::Event;
use crate::gap::{AddressType, BdAddr};
use crate::gatt::engine::GattEngine;
use crate::gatt::types::CharacteristicProperty;
use crate::transport::Pdu;
use crate::uuid::Uuid;
use log::debug;

impl GattEngine {
    /// Initiate a connection to a peripheral. Completion surfaces as a
    /// `PeripheralConnect` event; a peer that never answers surfaces as
    /// the caller's own deadline expiring.
    pub fn connect(&mut self, addr_type: AddressType, addr: BdAddr) -> GattResult<()> {
        self.connections.begin_connect(addr_type, addr)?;
        let pdu = Pdu::ConnectReq {
            addr_type: self.address().0,
            addr: self.address().1,
        };
        self.send(&pdu)
    }

    pub(crate) fn handle_connect_rsp(&mut self, conn: u16, addr_type: AddressType, addr: BdAddr) {
        if !self.connections.adopt(conn, addr_type, addr) {
            debug!("dropping unsolicited connect response from {addr}");
            return;
        }
        self.bus.emit(&Event::PeripheralConnect {
            conn,
            addr_type,
            addr,
        });
    }

    /// Sweep the peer's service table over a handle range. Each match
    /// surfaces as a `ServiceDiscovered` event.
    pub fn discover_services(
        &mut self,
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    ) -> GattResult<()> {
        if !self.connections.is_established(conn) {
            return Err(GattError::NotConnected);
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Discovering;
        }
        self.send(&Pdu::DiscoverServicesReq {
            conn,
            start_handle,
            end_handle,
        })
    }

    /// Sweep the peer's characteristics over a handle range. Each match
    /// surfaces as a `CharacteristicDiscovered` event.
    pub fn discover_characteristics(
        &mut self,
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    ) -> GattResult<()> {
        if !self.connections.is_established(conn) {
            return Err(GattError::NotConnected);
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Discovering;
        }
        self.send(&Pdu::DiscoverCharsReq {
            conn,
            start_handle,
            end_handle,
        })
    }

    pub(crate) fn handle_discover_services_rsp(
        &mut self,
        conn: u16,
        start_handle: u16,
        end_handle: u16,
        uuid: Uuid,
    ) {
        if !self.connections.is_established(conn) {
            debug!("conn {conn}: dropping stale service discovery response");
            return;
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Discovered;
        }
        self.bus.emit(&Event::ServiceDiscovered {
            conn,
            start_handle,
            end_handle,
            uuid,
        });
    }

    pub(crate) fn handle_discover_chars_rsp(
        &mut self,
        conn: u16,
        decl_handle: u16,
        value_handle: u16,
        properties: u8,
        uuid: Uuid,
    ) {
        if !self.connections.is_established(conn) {
            debug!("conn {conn}: dropping stale characteristic discovery response");
            return;
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Discovered;
        }
        self.bus.emit(&Event::CharacteristicDiscovered {
            conn,
            decl_handle,
            value_handle,
            properties: CharacteristicProperty::from_bits_truncate(properties),
            uuid,
        });
    }

    /// Write to a remote characteristic value. With `with_response` the
    /// outcome surfaces later as exactly one `WriteStatus` event; a
    /// write-without-response produces no status at all.
    pub fn write(
        &mut self,
        conn: u16,
        handle: u16,
        value: &[u8],
        with_response: bool,
    ) -> GattResult<()> {
        if !self.connections.is_established(conn) {
            return Err(GattError::NotConnected);
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Active;
        }
        if with_response {
            let txid = self.pending_writes.allocate(conn);
            self.send(&Pdu::WriteReq {
                conn,
                txid,
                handle,
                value: value.to_vec(),
            })
        } else {
            self.send(&Pdu::WriteCmd {
                conn,
                handle,
                value: value.to_vec(),
            })
        }
    }

    pub(crate) fn handle_write_rsp(&mut self, conn: u16, txid: u32, status: u8) {
        match self.pending_writes.complete(txid) {
            Some(owner) if owner == conn && self.connections.is_established(conn) => {
                self.bus.emit(&Event::WriteStatus { conn, status });
            }
            _ => debug!("conn {conn}: dropping status for stale write txid {txid}"),
        }
    }

    /// Read a remote characteristic value. Completion surfaces as a
    /// `ReadResult` event. At most one read may be outstanding per
    /// connection.
    pub fn read(&mut self, conn: u16, handle: u16) -> GattResult<()> {
        if !self.connections.is_established(conn) {
            return Err(GattError::NotConnected);
        }
        if self.pending_reads.contains_key(&conn) {
            return Err(GattError::NotPermitted);
        }
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.state = ConnectionState::Active;
        }
        self.pending_reads.insert(conn, handle);
        self.send(&Pdu::ReadReq { conn, handle })
    }

    pub(crate) fn handle_read_rsp(&mut self, conn: u16, handle: u16, value: Vec<u8>) {
        if self.pending_reads.remove(&conn).is_none() {
            debug!("conn {conn}: dropping unsolicited read response");
            return;
        }
        self.bus.emit(&Event::ReadResult {
            conn,
            handle,
            value,
        });
    }

    pub(crate) fn handle_notify(&mut self, conn: u16, handle: u16, value: Vec<u8>) {
        if !self.connections.is_established(conn) {
            debug!("conn {conn}: dropping notification on dead link");
            return;
        }
        self.bus.emit(&Event::Notify {
            conn,
            handle,
            value,
        });
    }
}
