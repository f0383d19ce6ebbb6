//! GATT engine core
//!
//! One engine per device, playing both roles over a single transport.
//! The engine is single-threaded and cooperative: nothing happens
//! between `poll` calls, and each `poll` drains every inbound datagram,
//! dispatching to the role handlers and emitting events synchronously.

use crate::conn::{ConnectionManager, ConnectionState};
use crate::error::GattResult;
use crate::event::{Event, EventBus, EventHandler};
use crate::gap::{AddressType, BdAddr, Role};
use crate::gatt::pending::PendingWrites;
use crate::gatt::store::AttributeStore;
use crate::transport::{Pdu, Transport};
use log::{debug, warn};
use std::collections::HashMap;

/// An event-driven GATT engine for one device.
pub struct GattEngine {
    addr: BdAddr,
    addr_type: AddressType,
    transport: Box<dyn Transport>,
    pub(crate) store: AttributeStore,
    pub(crate) connections: ConnectionManager,
    pub(crate) bus: EventBus,
    pub(crate) advertising: bool,
    pub(crate) adv_payload: Vec<u8>,
    pub(crate) adv_interval_us: u32,
    pub(crate) pending_writes: PendingWrites,
    /// Outstanding client reads, one per connection at most.
    pub(crate) pending_reads: HashMap<u16, u16>,
}

impl GattEngine {
    pub fn new(addr_type: AddressType, addr: BdAddr, transport: Box<dyn Transport>) -> Self {
        Self {
            addr,
            addr_type,
            transport,
            store: AttributeStore::new(),
            connections: ConnectionManager::new(),
            bus: EventBus::new(),
            advertising: false,
            adv_payload: Vec::new(),
            adv_interval_us: 0,
            pending_writes: PendingWrites::new(),
            pending_reads: HashMap::new(),
        }
    }

    pub fn address(&self) -> (AddressType, BdAddr) {
        (self.addr_type, self.addr)
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Interval and payload of the current advertisement.
    pub fn advertising_parameters(&self) -> (u32, &[u8]) {
        (self.adv_interval_us, &self.adv_payload)
    }

    /// Current state of a link, `None` once it is retired.
    pub fn connection_state(&self, conn: u16) -> Option<ConnectionState> {
        self.connections.get(conn).map(|c| c.state)
    }

    /// Install the event handler, replacing any previous one.
    pub fn on_event(&mut self, handler: EventHandler) {
        self.bus.register(handler);
    }

    /// Drain and dispatch every inbound datagram. Events fire from
    /// inside this call, in arrival order.
    pub fn poll(&mut self) {
        loop {
            let Some(datagram) = self.transport.recv() else {
                break;
            };
            match Pdu::decode(&datagram) {
                Ok(pdu) => self.handle_pdu(pdu),
                Err(err) => warn!("dropping undecodable datagram: {err}"),
            }
        }
    }

    fn handle_pdu(&mut self, pdu: Pdu) {
        match pdu {
            Pdu::ConnectReq { addr_type, addr } => self.handle_connect_req(addr_type, addr),
            Pdu::ConnectRsp {
                conn,
                addr_type,
                addr,
            } => self.handle_connect_rsp(conn, addr_type, addr),
            Pdu::DisconnectReq { conn } => self.handle_disconnect_req(conn),
            Pdu::DisconnectRsp { conn } => self.handle_disconnect_rsp(conn),
            Pdu::DiscoverServicesReq {
                conn,
                start_handle,
                end_handle,
            } => self.handle_discover_services_req(conn, start_handle, end_handle),
            Pdu::DiscoverServicesRsp {
                conn,
                start_handle,
                end_handle,
                uuid,
            } => self.handle_discover_services_rsp(conn, start_handle, end_handle, uuid),
            Pdu::DiscoverCharsReq {
                conn,
                start_handle,
                end_handle,
            } => self.handle_discover_chars_req(conn, start_handle, end_handle),
            Pdu::DiscoverCharsRsp {
                conn,
                decl_handle,
                value_handle,
                properties,
                uuid,
            } => self.handle_discover_chars_rsp(conn, decl_handle, value_handle, properties, uuid),
            Pdu::ReadReq { conn, handle } => self.handle_read_req(conn, handle),
            Pdu::ReadRsp {
                conn,
                handle,
                value,
            } => self.handle_read_rsp(conn, handle, value),
            Pdu::WriteCmd {
                conn,
                handle,
                value,
            } => self.handle_write_cmd(conn, handle, &value),
            Pdu::WriteReq {
                conn,
                txid,
                handle,
                value,
            } => self.handle_write_req(conn, txid, handle, &value),
            Pdu::WriteRsp { conn, txid, status } => self.handle_write_rsp(conn, txid, status),
            Pdu::Notify {
                conn,
                handle,
                value,
            } => self.handle_notify(conn, handle, value),
        }
    }

    pub(crate) fn send(&mut self, pdu: &Pdu) -> GattResult<()> {
        self.transport.send(&pdu.encode())
    }

    /// Initiate teardown of a link. Idempotent: disconnecting an
    /// unknown or already-disconnecting handle is a no-op.
    pub fn disconnect(&mut self, conn: u16) -> GattResult<()> {
        let Some(connection) = self.connections.get_mut(conn) else {
            return Ok(());
        };
        if connection.state == ConnectionState::Disconnecting {
            return Ok(());
        }
        connection.state = ConnectionState::Disconnecting;
        debug!("conn {conn}: disconnect requested");
        self.send(&Pdu::DisconnectReq { conn })
    }

    fn handle_disconnect_req(&mut self, conn: u16) {
        if self.connections.get(conn).is_none() {
            return;
        }
        if let Err(err) = self.send(&Pdu::DisconnectRsp { conn }) {
            warn!("conn {conn}: disconnect response failed: {err}");
        }
        self.teardown(conn);
    }

    fn handle_disconnect_rsp(&mut self, conn: u16) {
        self.teardown(conn);
    }

    /// Retire a link: drop its pending work, then emit the role-side
    /// disconnect event.
    pub(crate) fn teardown(&mut self, conn: u16) {
        let Some(connection) = self.connections.remove(conn) else {
            return;
        };
        let dropped = self.pending_writes.drop_connection(conn);
        if dropped > 0 {
            debug!("conn {conn}: {dropped} pending write(s) invalidated");
        }
        self.pending_reads.remove(&conn);

        let event = match connection.local_role {
            Role::Peripheral => Event::CentralDisconnect {
                conn,
                addr_type: connection.peer_type,
                addr: connection.peer,
            },
            Role::Central => Event::PeripheralDisconnect {
                conn,
                addr_type: connection.peer_type,
                addr: connection.peer,
            },
        };
        self.bus.emit(&event);
    }
}
