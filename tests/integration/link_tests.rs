//! Simulated BLE peer → `LINK_EVENTS` → control loop → BLE notifications.
//!
//! `LINK_EVENTS` is process-wide, so only this module posts to it.

use medbox::adapters::ble::{BleLink, DEVICE_NAME};
use medbox::app::ports::Ports;
use medbox::app::service::AppService;
use medbox::app::state::{DeviceState, SensorReading};
use medbox::config::DeviceConfig;
use medbox::rpc::channels::{EVENT_DEPTH, LINK_EVENTS};
use medbox::rpc::codec::Report;
use medbox::rpc::engine::LongOperation;

use super::mock_hw::{MockBoard, UpdateCall};

fn pass(app: &mut AppService, ble: &mut BleLink, board: &mut MockBoard) -> usize {
    let mut ports = Ports {
        link: ble,
        storage: &mut board.nvs,
        history: &mut board.history,
        update: &mut board.update,
        clock: &mut board.clock,
        system: &mut board.system,
        display: &mut board.display,
    };
    let handled = app.drain(&LINK_EVENTS, &mut ports);
    app.tick(&mut ports);
    handled
}

fn received(ble: &mut BleLink) -> Vec<Report> {
    ble.sim_take_sent()
        .iter()
        .map(|f| Report::decode(f).expect("undecodable notification"))
        .collect()
}

#[test]
fn queued_writes_are_answered_in_order() {
    let mut board = MockBoard::new(32);
    board.record(0, 5);
    let mut app = AppService::new(DeviceConfig::default(), DeviceState::default());
    app.update_sensor(Some(SensorReading {
        temperature: 22.0,
        humidity: 48.0,
    }));

    let mut ble = BleLink::new(DEVICE_NAME);
    ble.start();

    let connect = ble.sim_connect(247);
    ble.sim_post(connect);
    ble.sim_post(ble.sim_write(&[0x01]));
    ble.sim_post(ble.sim_write(&[0x20]));
    ble.sim_post(ble.sim_write(&[0x30]));
    ble.sim_post(ble.sim_write(&[0x31]));

    assert_eq!(pass(&mut app, &mut ble, &mut board), 5);
    assert!(app.state().connected);

    // MTU 247 fits the whole history in one frame, sent on the same tick.
    let reports = received(&mut ble);
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0], Report::ProtocolVersion(2));
    assert_eq!(reports[1], Report::Status(0x0F));
    assert_eq!(
        reports[2],
        Report::Environment {
            temperature_centi: 2200,
            humidity_centi: 4800,
        }
    );
    assert!(matches!(&reports[3], Report::HistoricPoints(p) if p.len() == 5));
    assert_eq!(reports[4], Report::HistoricEnd);

    // A full channel drops the overflow instead of blocking the BLE task.
    for _ in 0..EVENT_DEPTH + 4 {
        ble.sim_post(ble.sim_write(&[0x14]));
    }
    assert_eq!(pass(&mut app, &mut ble, &mut board), EVENT_DEPTH);
    assert_eq!(received(&mut ble).len(), EVENT_DEPTH);

    let disconnect = ble.sim_disconnect();
    ble.sim_post(disconnect);
    assert_eq!(pass(&mut app, &mut ble, &mut board), 1);
    assert!(!app.state().connected);
    assert!(received(&mut ble).is_empty());

    // A Disconnected event lost to a full channel still ends the update.
    let connect = ble.sim_connect(247);
    ble.sim_post(connect);
    let mut start = vec![0xA0];
    start.extend_from_slice(&1000u32.to_le_bytes());
    ble.sim_post(ble.sim_write(&start));
    assert_eq!(pass(&mut app, &mut ble, &mut board), 2);
    assert_eq!(received(&mut ble), vec![Report::Ack]);
    assert_eq!(app.engine().long_operation(), LongOperation::Ota);

    for _ in 0..EVENT_DEPTH {
        ble.sim_post(ble.sim_write(&[0xA1, 0xE9, 0x01, 0x02]));
    }
    let disconnect = ble.sim_disconnect();
    ble.sim_post(disconnect);
    assert_eq!(pass(&mut app, &mut ble, &mut board), EVENT_DEPTH);
    assert!(!app.state().connected);
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert_eq!(board.update.calls.last(), Some(&UpdateCall::Abort));
    assert!(!board.update.committed);
}
