//! PDU encoding for the loopback transport
//!
//! The engine exchanges a small closed set of PDUs over the datagram
//! channel. The wire layout is internal to this crate: one opcode byte
//! followed by little-endian fields, variable-length values last.

use crate::error::{GattError, GattResult};
use crate::gap::{AddressType, BdAddr};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

// Opcode values
pub const OP_CONNECT_REQ: u8 = 0x01;
pub const OP_CONNECT_RSP: u8 = 0x02;
pub const OP_DISCONNECT_REQ: u8 = 0x03;
pub const OP_DISCONNECT_RSP: u8 = 0x04;
pub const OP_DISCOVER_SERVICES_REQ: u8 = 0x05;
pub const OP_DISCOVER_SERVICES_RSP: u8 = 0x06;
pub const OP_DISCOVER_CHARS_REQ: u8 = 0x07;
pub const OP_DISCOVER_CHARS_RSP: u8 = 0x08;
pub const OP_READ_REQ: u8 = 0x09;
pub const OP_READ_RSP: u8 = 0x0A;
pub const OP_WRITE_CMD: u8 = 0x0B;
pub const OP_WRITE_REQ: u8 = 0x0C;
pub const OP_WRITE_RSP: u8 = 0x0D;
pub const OP_NOTIFY: u8 = 0x0E;

// Write status codes, ATT error-code values
pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_INVALID_HANDLE: u8 = 0x01;
pub const STATUS_WRITE_NOT_PERMITTED: u8 = 0x03;

/// A protocol data unit carried by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    ConnectReq {
        addr_type: AddressType,
        addr: BdAddr,
    },
    ConnectRsp {
        conn: u16,
        addr_type: AddressType,
        addr: BdAddr,
    },
    DisconnectReq {
        conn: u16,
    },
    DisconnectRsp {
        conn: u16,
    },
    DiscoverServicesReq {
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    },
    DiscoverServicesRsp {
        conn: u16,
        start_handle: u16,
        end_handle: u16,
        uuid: Uuid,
    },
    DiscoverCharsReq {
        conn: u16,
        start_handle: u16,
        end_handle: u16,
    },
    DiscoverCharsRsp {
        conn: u16,
        decl_handle: u16,
        value_handle: u16,
        properties: u8,
        uuid: Uuid,
    },
    ReadReq {
        conn: u16,
        handle: u16,
    },
    ReadRsp {
        conn: u16,
        handle: u16,
        value: Vec<u8>,
    },
    WriteCmd {
        conn: u16,
        handle: u16,
        value: Vec<u8>,
    },
    WriteReq {
        conn: u16,
        txid: u32,
        handle: u16,
        value: Vec<u8>,
    },
    WriteRsp {
        conn: u16,
        txid: u32,
        status: u8,
    },
    Notify {
        conn: u16,
        handle: u16,
        value: Vec<u8>,
    },
}

fn write_uuid(out: &mut Vec<u8>, uuid: &Uuid) {
    let bytes = uuid.as_bytes();
    out.write_u8(bytes.len() as u8).unwrap();
    out.extend_from_slice(&bytes);
}

fn read_uuid(cursor: &mut Cursor<&[u8]>) -> GattResult<Uuid> {
    let len = cursor.read_u8().map_err(|_| GattError::InvalidPdu)? as usize;
    let mut bytes = vec![0u8; len];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| GattError::InvalidPdu)?;
    Uuid::from_bytes(&bytes).ok_or(GattError::InvalidPdu)
}

fn read_addr(cursor: &mut Cursor<&[u8]>) -> GattResult<(AddressType, BdAddr)> {
    let addr_type = AddressType::from(cursor.read_u8().map_err(|_| GattError::InvalidPdu)?);
    let mut bytes = [0u8; 6];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| GattError::InvalidPdu)?;
    Ok((addr_type, BdAddr::new(bytes)))
}

fn read_rest(cursor: &mut Cursor<&[u8]>) -> GattResult<Vec<u8>> {
    let mut value = Vec::new();
    cursor
        .read_to_end(&mut value)
        .map_err(|_| GattError::InvalidPdu)?;
    Ok(value)
}

impl Pdu {
    /// Serialize the PDU into a transport datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Pdu::ConnectReq { addr_type, addr } => {
                out.write_u8(OP_CONNECT_REQ).unwrap();
                out.write_u8(u8::from(*addr_type)).unwrap();
                out.extend_from_slice(addr.as_slice());
            }
            Pdu::ConnectRsp {
                conn,
                addr_type,
                addr,
            } => {
                out.write_u8(OP_CONNECT_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u8(u8::from(*addr_type)).unwrap();
                out.extend_from_slice(addr.as_slice());
            }
            Pdu::DisconnectReq { conn } => {
                out.write_u8(OP_DISCONNECT_REQ).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
            }
            Pdu::DisconnectRsp { conn } => {
                out.write_u8(OP_DISCONNECT_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
            }
            Pdu::DiscoverServicesReq {
                conn,
                start_handle,
                end_handle,
            } => {
                out.write_u8(OP_DISCOVER_SERVICES_REQ).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*start_handle).unwrap();
                out.write_u16::<LittleEndian>(*end_handle).unwrap();
            }
            Pdu::DiscoverServicesRsp {
                conn,
                start_handle,
                end_handle,
                uuid,
            } => {
                out.write_u8(OP_DISCOVER_SERVICES_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*start_handle).unwrap();
                out.write_u16::<LittleEndian>(*end_handle).unwrap();
                write_uuid(&mut out, uuid);
            }
            Pdu::DiscoverCharsReq {
                conn,
                start_handle,
                end_handle,
            } => {
                out.write_u8(OP_DISCOVER_CHARS_REQ).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*start_handle).unwrap();
                out.write_u16::<LittleEndian>(*end_handle).unwrap();
            }
            Pdu::DiscoverCharsRsp {
                conn,
                decl_handle,
                value_handle,
                properties,
                uuid,
            } => {
                out.write_u8(OP_DISCOVER_CHARS_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*decl_handle).unwrap();
                out.write_u16::<LittleEndian>(*value_handle).unwrap();
                out.write_u8(*properties).unwrap();
                write_uuid(&mut out, uuid);
            }
            Pdu::ReadReq { conn, handle } => {
                out.write_u8(OP_READ_REQ).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*handle).unwrap();
            }
            Pdu::ReadRsp {
                conn,
                handle,
                value,
            } => {
                out.write_u8(OP_READ_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*handle).unwrap();
                out.extend_from_slice(value);
            }
            Pdu::WriteCmd {
                conn,
                handle,
                value,
            } => {
                out.write_u8(OP_WRITE_CMD).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*handle).unwrap();
                out.extend_from_slice(value);
            }
            Pdu::WriteReq {
                conn,
                txid,
                handle,
                value,
            } => {
                out.write_u8(OP_WRITE_REQ).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u32::<LittleEndian>(*txid).unwrap();
                out.write_u16::<LittleEndian>(*handle).unwrap();
                out.extend_from_slice(value);
            }
            Pdu::WriteRsp { conn, txid, status } => {
                out.write_u8(OP_WRITE_RSP).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u32::<LittleEndian>(*txid).unwrap();
                out.write_u8(*status).unwrap();
            }
            Pdu::Notify {
                conn,
                handle,
                value,
            } => {
                out.write_u8(OP_NOTIFY).unwrap();
                out.write_u16::<LittleEndian>(*conn).unwrap();
                out.write_u16::<LittleEndian>(*handle).unwrap();
                out.extend_from_slice(value);
            }
        }
        out
    }

    /// Parse a transport datagram into a PDU.
    pub fn decode(data: &[u8]) -> GattResult<Pdu> {
        let mut cursor = Cursor::new(data);
        let opcode = cursor.read_u8().map_err(|_| GattError::InvalidPdu)?;
        match opcode {
            OP_CONNECT_REQ => {
                let (addr_type, addr) = read_addr(&mut cursor)?;
                Ok(Pdu::ConnectReq { addr_type, addr })
            }
            OP_CONNECT_RSP => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let (addr_type, addr) = read_addr(&mut cursor)?;
                Ok(Pdu::ConnectRsp {
                    conn,
                    addr_type,
                    addr,
                })
            }
            OP_DISCONNECT_REQ => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                Ok(Pdu::DisconnectReq { conn })
            }
            OP_DISCONNECT_RSP => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                Ok(Pdu::DisconnectRsp { conn })
            }
            OP_DISCOVER_SERVICES_REQ | OP_DISCOVER_CHARS_REQ => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let start_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let end_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                if opcode == OP_DISCOVER_SERVICES_REQ {
                    Ok(Pdu::DiscoverServicesReq {
                        conn,
                        start_handle,
                        end_handle,
                    })
                } else {
                    Ok(Pdu::DiscoverCharsReq {
                        conn,
                        start_handle,
                        end_handle,
                    })
                }
            }
            OP_DISCOVER_SERVICES_RSP => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let start_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let end_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let uuid = read_uuid(&mut cursor)?;
                Ok(Pdu::DiscoverServicesRsp {
                    conn,
                    start_handle,
                    end_handle,
                    uuid,
                })
            }
            OP_DISCOVER_CHARS_RSP => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let decl_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let value_handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let properties = cursor.read_u8().map_err(|_| GattError::InvalidPdu)?;
                let uuid = read_uuid(&mut cursor)?;
                Ok(Pdu::DiscoverCharsRsp {
                    conn,
                    decl_handle,
                    value_handle,
                    properties,
                    uuid,
                })
            }
            OP_READ_REQ => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                Ok(Pdu::ReadReq { conn, handle })
            }
            OP_READ_RSP | OP_WRITE_CMD | OP_NOTIFY => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let value = read_rest(&mut cursor)?;
                match opcode {
                    OP_READ_RSP => Ok(Pdu::ReadRsp {
                        conn,
                        handle,
                        value,
                    }),
                    OP_WRITE_CMD => Ok(Pdu::WriteCmd {
                        conn,
                        handle,
                        value,
                    }),
                    _ => Ok(Pdu::Notify {
                        conn,
                        handle,
                        value,
                    }),
                }
            }
            OP_WRITE_REQ => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let txid = cursor
                    .read_u32::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let handle = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let value = read_rest(&mut cursor)?;
                Ok(Pdu::WriteReq {
                    conn,
                    txid,
                    handle,
                    value,
                })
            }
            OP_WRITE_RSP => {
                let conn = cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let txid = cursor
                    .read_u32::<LittleEndian>()
                    .map_err(|_| GattError::InvalidPdu)?;
                let status = cursor.read_u8().map_err(|_| GattError::InvalidPdu)?;
                Ok(Pdu::WriteRsp { conn, txid, status })
            }
            _ => Err(GattError::InvalidPdu),
        }
    }
}
