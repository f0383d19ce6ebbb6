//! End-to-end scenarios over a loopback transport pair.

use crate::conn::ConnectionState;
use crate::error::GattError;
use crate::event::{wait_until, Event, EventKind, EventRecorder};
use crate::gap::{AddressType, BdAddr};
use crate::gatt::{
    CharacteristicDefinition, CharacteristicProperty, GattEngine, ServiceDefinition,
};
use crate::transport::loopback_pair;
use crate::transport::pdu::STATUS_SUCCESS;
use crate::uuid::Uuid;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(1);
const ADV_INTERVAL_US: u32 = 250_000;

fn service_uuid() -> Uuid {
    Uuid::from_u128(0x00000001_1111_2222_3333_444444444444)
}

fn ctrl_uuid() -> Uuid {
    Uuid::from_u128(0x00000002_1111_2222_3333_444444444444)
}

fn rx_uuid() -> Uuid {
    Uuid::from_u128(0x00000003_1111_2222_3333_444444444444)
}

fn tx_uuid() -> Uuid {
    Uuid::from_u128(0x00000004_1111_2222_3333_444444444444)
}

fn data_transfer_service() -> ServiceDefinition {
    ServiceDefinition::new(
        service_uuid(),
        vec![
            CharacteristicDefinition::new(
                ctrl_uuid(),
                CharacteristicProperty::WRITE | CharacteristicProperty::NOTIFY,
            ),
            CharacteristicDefinition::new(
                rx_uuid(),
                CharacteristicProperty::WRITE | CharacteristicProperty::WRITE_WITHOUT_RESPONSE,
            ),
            CharacteristicDefinition::new(tx_uuid(), CharacteristicProperty::NOTIFY),
        ],
    )
}

struct Fixture {
    server: GattEngine,
    client: GattEngine,
    server_events: EventRecorder,
    client_events: EventRecorder,
    conn: u16,
    ctrl: u16,
    rx: u16,
    tx: u16,
}

/// Bring up an advertising server and a connected client.
fn connected_pair() -> Fixture {
    let (server_end, client_end) = loopback_pair();
    let mut server = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(server_end));
    let mut client = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(client_end));

    let server_events = EventRecorder::new();
    let client_events = EventRecorder::new();
    server.on_event(server_events.handler());
    client.on_event(client_events.handler());

    let groups = server.register_services(&[data_transfer_service()]).unwrap();
    let (ctrl, rx, tx) = (groups[0][0], groups[0][1], groups[0][2]);
    server.configure_buffer(rx, 100, true).unwrap();
    server.advertise(ADV_INTERVAL_US, b"gattlink-test");

    let (peer_type, peer_addr) = server.address();
    client.connect(peer_type, peer_addr).unwrap();
    wait_until(
        WAIT,
        || {
            server.poll();
            client.poll();
        },
        || client_events.count(|e| e.kind() == EventKind::PeripheralConnect) >= 1,
    )
    .unwrap();

    let conn = client_events
        .find(|e| e.kind() == EventKind::PeripheralConnect)
        .unwrap()
        .conn();
    assert_eq!(
        server_events.count(|e| e.kind() == EventKind::CentralConnect),
        1
    );

    Fixture {
        server,
        client,
        server_events,
        client_events,
        conn,
        ctrl,
        rx,
        tx,
    }
}

fn drive(server: &mut GattEngine, client: &mut GattEngine) {
    server.poll();
    client.poll();
}

#[test]
fn append_buffer_accumulates_serial_writes() {
    let mut f = connected_pair();

    for i in 0..4u8 {
        let payload = format!("central{i}");
        f.client
            .write(f.conn, f.rx, payload.as_bytes(), i & 1 == 1)
            .unwrap();
        wait_until(
            WAIT,
            || drive(&mut f.server, &mut f.client),
            || {
                f.server_events
                    .count(|e| e.kind() == EventKind::AttributeWrite)
                    >= usize::from(i) + 1
            },
        )
        .unwrap();
    }

    assert_eq!(
        f.server.read_value(f.rx).unwrap(),
        b"central0central1central2central3"
    );
    // Reads drain the buffer
    assert_eq!(f.server.read_value(f.rx).unwrap(), Vec::<u8>::new());
}

#[test]
fn acked_writes_produce_exactly_their_statuses() {
    let mut f = connected_pair();

    for i in 0..4u8 {
        let payload = format!("central{i}");
        f.client
            .write(f.conn, f.rx, payload.as_bytes(), i & 1 == 1)
            .unwrap();
    }
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::WriteStatus) >= 2,
    )
    .unwrap();
    drive(&mut f.server, &mut f.client);

    // Only the two acknowledged writes have statuses, both success.
    assert_eq!(
        f.client_events.count(|e| e.kind() == EventKind::WriteStatus),
        2
    );
    assert_eq!(
        f.client_events
            .count(|e| matches!(e, Event::WriteStatus { status, .. } if *status == STATUS_SUCCESS)),
        2
    );
}

#[test]
fn notifications_arrive_in_order() {
    let mut f = connected_pair();

    for i in 0..4u8 {
        let payload = format!("message{i}");
        f.server.notify(f.conn, f.tx, payload.as_bytes()).unwrap();
    }
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::Notify) >= 4,
    )
    .unwrap();

    let notified: Vec<Vec<u8>> = f
        .client_events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Notify { handle, value, .. } => {
                assert_eq!(handle, f.tx);
                Some(value)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        notified,
        vec![
            b"message0".to_vec(),
            b"message1".to_vec(),
            b"message2".to_vec(),
            b"message3".to_vec()
        ]
    );
}

#[test]
fn notify_requires_the_notify_property_and_a_live_link() {
    let mut f = connected_pair();

    assert!(matches!(
        f.server.notify(f.conn, f.rx, b"nope"),
        Err(GattError::NotPermitted)
    ));
    assert!(matches!(
        f.server.notify(f.conn, 0x7777, b"nope"),
        Err(GattError::InvalidHandle(0x7777))
    ));
    assert!(matches!(
        f.server.notify(f.conn + 100, f.tx, b"nope"),
        Err(GattError::NotConnected)
    ));
}

#[test]
fn characteristic_discovery_reports_each_characteristic_once() {
    let mut f = connected_pair();

    f.client
        .discover_characteristics(f.conn, 1, 0xFFFF)
        .unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::CharacteristicDiscovered)
                >= 3
        },
    )
    .unwrap();
    drive(&mut f.server, &mut f.client);

    let discovered: Vec<Event> = f
        .client_events
        .events()
        .into_iter()
        .filter(|e| e.kind() == EventKind::CharacteristicDiscovered)
        .collect();
    assert_eq!(discovered.len(), 3);

    let mut uuids = Vec::new();
    for event in &discovered {
        let Event::CharacteristicDiscovered {
            value_handle, uuid, ..
        } = event
        else {
            unreachable!();
        };
        assert_ne!(*value_handle, 0);
        assert!(!uuids.contains(uuid));
        uuids.push(uuid.clone());
    }
    assert_eq!(uuids, vec![ctrl_uuid(), rx_uuid(), tx_uuid()]);
    assert_eq!(
        f.client.connection_state(f.conn),
        Some(ConnectionState::Discovered)
    );
}

#[test]
fn service_discovery_reports_the_registered_service() {
    let mut f = connected_pair();

    f.client.discover_services(f.conn, 1, 0xFFFF).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::ServiceDiscovered)
                >= 1
        },
    )
    .unwrap();

    let event = f
        .client_events
        .find(|e| e.kind() == EventKind::ServiceDiscovered)
        .unwrap();
    let Event::ServiceDiscovered {
        start_handle,
        end_handle,
        uuid,
        ..
    } = event
    else {
        unreachable!();
    };
    assert_eq!(uuid, service_uuid());
    assert!(start_handle < end_handle);
}

#[test]
fn acknowledged_write_gets_exactly_one_status() {
    let mut f = connected_pair();

    f.client.write(f.conn, f.rx, b"payload", true).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::WriteStatus) >= 1,
    )
    .unwrap();
    drive(&mut f.server, &mut f.client);
    drive(&mut f.server, &mut f.client);

    assert_eq!(
        f.client_events.count(|e| e.kind() == EventKind::WriteStatus),
        1
    );
}

#[test]
fn unacknowledged_write_never_gets_a_status() {
    let mut f = connected_pair();

    f.client.write(f.conn, f.rx, b"payload", false).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.server_events
                .count(|e| e.kind() == EventKind::AttributeWrite)
                >= 1
        },
    )
    .unwrap();
    drive(&mut f.server, &mut f.client);

    assert_eq!(
        f.client_events.count(|e| e.kind() == EventKind::WriteStatus),
        0
    );
}

#[test]
fn disconnect_invalidates_pending_write_statuses() {
    let mut f = connected_pair();

    f.client.write(f.conn, f.rx, b"payload", true).unwrap();
    // Let the server ack the write, but tear the link down before the
    // client processes the acknowledgement.
    f.server.poll();
    f.client.disconnect(f.conn).unwrap();

    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::PeripheralDisconnect)
                >= 1
        },
    )
    .unwrap();
    drive(&mut f.server, &mut f.client);

    assert_eq!(
        f.client_events.count(|e| e.kind() == EventKind::WriteStatus),
        0
    );
    assert_eq!(
        f.server_events
            .count(|e| e.kind() == EventKind::CentralDisconnect),
        1
    );
}

#[test]
fn disconnect_is_idempotent() {
    let mut f = connected_pair();

    f.client.disconnect(f.conn).unwrap();
    f.client.disconnect(f.conn).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::PeripheralDisconnect)
                >= 1
        },
    )
    .unwrap();

    // Disconnecting a retired handle is a no-op.
    f.client.disconnect(f.conn).unwrap();
    drive(&mut f.server, &mut f.client);
    assert_eq!(
        f.client_events
            .count(|e| e.kind() == EventKind::PeripheralDisconnect),
        1
    );
    assert_eq!(
        f.server_events
            .count(|e| e.kind() == EventKind::CentralDisconnect),
        1
    );
}

#[test]
fn connect_to_a_silent_peer_times_out() {
    let (server_end, client_end) = loopback_pair();
    // Server exists but never advertises, so the request is dropped.
    let mut server = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(server_end));
    let mut client = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(client_end));
    let client_events = EventRecorder::new();
    client.on_event(client_events.handler());

    let (peer_type, peer_addr) = server.address();
    client.connect(peer_type, peer_addr).unwrap();
    let result = wait_until(
        Duration::from_millis(50),
        || drive(&mut server, &mut client),
        || client_events.generation() > 0,
    );
    assert!(matches!(result, Err(GattError::Timeout)));
}

#[test]
fn second_connect_to_a_linked_peer_is_refused() {
    let mut f = connected_pair();
    let (peer_type, peer_addr) = f.server.address();
    assert!(matches!(
        f.client.connect(peer_type, peer_addr),
        Err(GattError::NotPermitted)
    ));
}

#[test]
fn read_round_trips_and_overlapping_reads_are_refused() {
    let mut f = connected_pair();

    f.client.write(f.conn, f.rx, b"hello", false).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.server_events
                .count(|e| e.kind() == EventKind::AttributeWrite)
                >= 1
        },
    )
    .unwrap();

    f.client.read(f.conn, f.rx).unwrap();
    assert!(matches!(
        f.client.read(f.conn, f.rx),
        Err(GattError::NotPermitted)
    ));
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::ReadResult) >= 1,
    )
    .unwrap();

    let event = f
        .client_events
        .find(|e| e.kind() == EventKind::ReadResult)
        .unwrap();
    assert_eq!(
        event,
        Event::ReadResult {
            conn: f.conn,
            handle: f.rx,
            value: b"hello".to_vec()
        }
    );

    // The outstanding slot frees up once the result arrives.
    f.client.read(f.conn, f.rx).unwrap();
}

#[test]
fn registration_is_rejected_once_advertising() {
    let mut f = connected_pair();
    assert!(f.server.is_advertising());
    assert_eq!(
        f.server.advertising_parameters(),
        (ADV_INTERVAL_US, &b"gattlink-test"[..])
    );
    assert!(matches!(
        f.server.register_services(&[data_transfer_service()]),
        Err(GattError::Registration(_))
    ));
}

#[test]
fn operations_on_a_dead_link_fail_with_not_connected() {
    let mut f = connected_pair();
    let stale = f.conn + 100;

    assert!(matches!(
        f.client.write(stale, f.rx, b"x", true),
        Err(GattError::NotConnected)
    ));
    assert!(matches!(
        f.client.read(stale, f.rx),
        Err(GattError::NotConnected)
    ));
    assert!(matches!(
        f.client.discover_services(stale, 1, 0xFFFF),
        Err(GattError::NotConnected)
    ));
    assert!(matches!(
        f.client.discover_characteristics(stale, 1, 0xFFFF),
        Err(GattError::NotConnected)
    ));
}

/// The full exchange: connect, discover, stream writes one way, stream
/// notifications the other, handshake over the control characteristic,
/// and disconnect.
#[test]
fn full_data_transfer_exchange() {
    let mut f = connected_pair();

    f.client
        .discover_characteristics(f.conn, 1, 0xFFFF)
        .unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::CharacteristicDiscovered)
                >= 3
        },
    )
    .unwrap();

    // Central streams four messages into the append buffer.
    for i in 0..4u8 {
        let payload = format!("central{i}");
        f.client
            .write(f.conn, f.rx, payload.as_bytes(), i & 1 == 1)
            .unwrap();
    }
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.server_events
                .count(|e| e.kind() == EventKind::AttributeWrite)
                >= 4
                && f.client_events.count(|e| e.kind() == EventKind::WriteStatus) >= 2
        },
    )
    .unwrap();
    assert_eq!(
        f.server.read_value(f.rx).unwrap(),
        b"central0central1central2central3"
    );

    // Peripheral streams four notifications back.
    for i in 0..4u8 {
        let payload = format!("message{i}");
        f.server.notify(f.conn, f.tx, payload.as_bytes()).unwrap();
    }
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::Notify) >= 4,
    )
    .unwrap();

    // Control handshake, then teardown.
    f.client.write(f.conn, f.ctrl, b"OK", true).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || f.client_events.count(|e| e.kind() == EventKind::WriteStatus) >= 3,
    )
    .unwrap();
    assert_eq!(f.server.read_value(f.ctrl).unwrap(), b"OK");

    f.client.disconnect(f.conn).unwrap();
    wait_until(
        WAIT,
        || drive(&mut f.server, &mut f.client),
        || {
            f.client_events
                .count(|e| e.kind() == EventKind::PeripheralDisconnect)
                >= 1
                && f.server_events
                    .count(|e| e.kind() == EventKind::CentralDisconnect)
                    >= 1
        },
    )
    .unwrap();
    assert!(f.client.connection_state(f.conn).is_none());
    assert!(f.server.connection_state(f.conn).is_none());
}
