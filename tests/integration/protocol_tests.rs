//! End-to-end command handling through `AppService`.

use medbox::app::ports::{Ports, StoragePort};
use medbox::app::service::AppService;
use medbox::app::state::{DeviceState, META_NS, SensorReading, WIFI_NS, key};
use medbox::config::DeviceConfig;
use medbox::rpc::channels::LinkEvent;
use medbox::rpc::codec::{ErrorCode, Report};

use super::mock_hw::{CountingStorage, MockBoard};

fn connected() -> (AppService, MockBoard) {
    let mut board = MockBoard::new(16);
    let mut app = AppService::new(DeviceConfig::default(), DeviceState::default());
    board.link.connected = true;
    app.handle_event(LinkEvent::Connected { mtu: 23 }, &mut board.ports());
    (app, board)
}

fn write(app: &mut AppService, board: &mut MockBoard, frame: &[u8]) -> Vec<Report> {
    app.handle_event(LinkEvent::frame(frame), &mut board.ports());
    board.link.take_reports()
}

#[test]
fn protocol_version_is_two() {
    let (mut app, mut board) = connected();
    assert_eq!(write(&mut app, &mut board, &[0x01]), vec![Report::ProtocolVersion(2)]);
}

#[test]
fn unknown_opcode_reports_error_03() {
    let (mut app, mut board) = connected();
    assert_eq!(
        write(&mut app, &mut board, &[0x55, 0x00]),
        vec![Report::Error(ErrorCode::UnknownCommand)]
    );
}

#[test]
fn malformed_frames_are_dropped_silently() {
    let (mut app, mut board) = connected();
    // TIME_SYNC too short, PROTOCOL_VERSION too long, SET_ALARM too short.
    for frame in [&[0x11, 1, 2][..], &[0x01, 0x00][..], &[0x41, 8][..]] {
        assert!(write(&mut app, &mut board, frame).is_empty());
    }
}

#[test]
fn short_ota_start_reports_length_error() {
    let (mut app, mut board) = connected();
    assert_eq!(
        write(&mut app, &mut board, &[0xA0, 0x10, 0x00]),
        vec![Report::Error(ErrorCode::Length)]
    );
}

#[test]
fn valid_alarm_is_applied_persisted_and_acked() {
    let (mut app, mut board) = connected();
    assert_eq!(write(&mut app, &mut board, &[0x41, 7, 45, 1]), vec![Report::Ack]);

    let alarm = app.state().alarm;
    assert_eq!((alarm.hour(), alarm.minute(), alarm.enabled()), (7, 45, true));

    let restored = DeviceState::load(&board.nvs);
    assert_eq!(restored.alarm, alarm);
}

#[test]
fn valid_alarm_writes_each_key_once() {
    let (mut app, mut board) = connected();
    let mut storage = CountingStorage::new();
    let mut ports = Ports {
        link: &mut board.link,
        storage: &mut storage,
        history: &mut board.history,
        update: &mut board.update,
        clock: &mut board.clock,
        system: &mut board.system,
        display: &mut board.display,
    };
    app.handle_event(LinkEvent::frame(&[0x41, 21, 5, 1]), &mut ports);
    assert_eq!(board.link.take_reports(), vec![Report::Ack]);

    for k in [key::ALARM_HOUR, key::ALARM_MINUTE, key::ALARM_ON] {
        assert_eq!(storage.writes_to(META_NS, k), 1, "{}", k);
    }
    assert_eq!(storage.writes.len(), 3);
    assert_eq!(DeviceState::load(&storage).alarm, app.state().alarm);
}

#[test]
fn out_of_range_alarm_is_acked_but_ignored() {
    let (mut app, mut board) = connected();
    let before = app.state().alarm;
    assert_eq!(write(&mut app, &mut board, &[0x41, 24, 0, 1]), vec![Report::Ack]);
    assert_eq!(write(&mut app, &mut board, &[0x41, 6, 60, 1]), vec![Report::Ack]);
    assert_eq!(app.state().alarm, before);
    assert!(!board.nvs.exists(META_NS, key::ALARM_HOUR));
}

#[test]
fn engineering_mode_round_trip() {
    let (mut app, mut board) = connected();
    assert_eq!(write(&mut app, &mut board, &[0x13, 0x01]), vec![Report::Ack]);
    assert_eq!(board.display.refreshes, 1);
    assert_eq!(
        write(&mut app, &mut board, &[0x14]),
        vec![Report::EngineeringMode(true)]
    );
    assert!(DeviceState::load(&board.nvs).engineering_mode);

    // Any value other than 0x01 turns it off.
    assert_eq!(write(&mut app, &mut board, &[0x13, 0x02]), vec![Report::Ack]);
    assert!(!app.state().engineering_mode);
}

#[test]
fn status_reports_box_mask() {
    let (mut app, mut board) = connected();
    assert_eq!(write(&mut app, &mut board, &[0x20]), vec![Report::Status(0x0F)]);
}

#[test]
fn environment_needs_valid_sensor() {
    let (mut app, mut board) = connected();
    assert_eq!(
        write(&mut app, &mut board, &[0x30]),
        vec![Report::Error(ErrorCode::SensorInvalid)]
    );

    app.update_sensor(Some(SensorReading {
        temperature: 23.45,
        humidity: 51.2,
    }));
    let reports = write(&mut app, &mut board, &[0x30]);
    let [Report::Environment {
        temperature_centi,
        humidity_centi,
    }] = reports[..]
    else {
        panic!("expected REPORT_ENV, got {:?}", reports);
    };
    assert!((2344..=2345).contains(&temperature_centi));
    assert!((5119..=5120).contains(&humidity_centi));
}

#[test]
fn time_sync_sets_clock_and_acks() {
    let (mut app, mut board) = connected();
    // 2025-03-14 08:30:00
    assert_eq!(
        write(&mut app, &mut board, &[0x11, 25, 3, 14, 8, 30, 0]),
        vec![Report::Ack]
    );
    assert_eq!(board.clock.wall, Some(1_741_941_000));
    assert_eq!(board.display.synced, 1);

    // February 30th never existed.
    assert!(write(&mut app, &mut board, &[0x11, 25, 2, 30, 8, 0, 0]).is_empty());
}

#[test]
fn wifi_credentials_are_persisted() {
    let (mut app, mut board) = connected();
    let mut frame = vec![0x12, 4];
    frame.extend_from_slice(b"home");
    frame.push(6);
    frame.extend_from_slice(b"secret");
    assert_eq!(write(&mut app, &mut board, &frame), vec![Report::Ack]);
    assert_eq!(board.system.wifi_restarts, 1);

    let mut buf = [0u8; 64];
    let n = board.nvs.read(WIFI_NS, key::SSID, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"home");
    let n = board.nvs.read(WIFI_NS, key::PASS, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"secret");
}

#[test]
fn realtime_stream_emits_on_cadence_until_disabled() {
    let (mut app, mut board) = connected();
    app.update_sensor(Some(SensorReading {
        temperature: 20.0,
        humidity: 40.0,
    }));
    assert_eq!(write(&mut app, &mut board, &[0x32]), vec![Report::Ack]);

    board.advance(1_000);
    app.tick(&mut board.ports());
    assert!(board.link.take_reports().is_empty());

    board.advance(1_000);
    app.tick(&mut board.ports());
    assert_eq!(
        board.link.take_reports(),
        vec![Report::Environment {
            temperature_centi: 2000,
            humidity_centi: 4000,
        }]
    );

    assert_eq!(write(&mut app, &mut board, &[0x33]), vec![Report::Ack]);
    board.advance(5_000);
    app.tick(&mut board.ports());
    assert!(board.link.take_reports().is_empty());
}

#[test]
fn disconnect_clears_session_flags() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &[0x32]);
    assert!(app.state().realtime_enabled);

    board.link.connected = false;
    app.handle_event(LinkEvent::Disconnected, &mut board.ports());
    assert!(!app.state().connected);
    assert!(!app.state().realtime_enabled);
}

#[test]
fn medication_taken_only_while_connected() {
    let (mut app, mut board) = connected();
    assert!(app.report_medication_taken(3, &mut board.ports()));
    assert_eq!(board.link.take_reports(), vec![Report::MedicationTaken(3)]);
    assert!(!app.report_medication_taken(8, &mut board.ports()));

    board.link.connected = false;
    app.handle_event(LinkEvent::Disconnected, &mut board.ports());
    assert!(!app.report_medication_taken(3, &mut board.ports()));
}

#[test]
fn alarm_rings_once_at_the_set_minute() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &[0x41, 8, 30, 1]);
    // Sync to 08:29:59.
    write(&mut app, &mut board, &[0x11, 25, 3, 14, 8, 29, 59]);

    app.tick(&mut board.ports());
    assert_eq!(board.system.alarms, 0);

    board.advance(1_000);
    app.tick(&mut board.ports());
    assert_eq!(board.system.alarms, 1);
    assert!(app.state().alarm_ringing);

    board.advance(1_000);
    app.tick(&mut board.ports());
    assert_eq!(board.system.alarms, 1);

    app.dismiss_alarm();
    assert!(!app.state().alarm_ringing);
}
