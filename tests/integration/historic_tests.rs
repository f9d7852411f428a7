//! Historic transfer driven through `AppService` against a file-backed ring.

use medbox::app::ports::HistoryPort;
use medbox::app::service::AppService;
use medbox::app::state::{DeviceState, SensorReading};
use medbox::config::DeviceConfig;
use medbox::rpc::channels::LinkEvent;
use medbox::rpc::codec::{ErrorCode, Report};
use medbox::rpc::engine::LongOperation;

use super::mock_hw::MockBoard;

/// 2025-03-14 08:30:00
const SYNCED_AT: i64 = 1_741_941_000;

fn setup(capacity: u32, samples: u32) -> (AppService, MockBoard) {
    let mut board = MockBoard::new(capacity);
    board.record(0, samples);
    board.clock.wall = Some(SYNCED_AT);
    board.link.connected = true;
    let mut app = AppService::new(DeviceConfig::default(), DeviceState::default());
    app.handle_event(LinkEvent::Connected { mtu: 23 }, &mut board.ports());
    (app, board)
}

fn request(app: &mut AppService, board: &mut MockBoard) -> Vec<Report> {
    app.handle_event(LinkEvent::frame(&[0x31]), &mut board.ports());
    board.link.take_reports()
}

fn step(app: &mut AppService, board: &mut MockBoard) -> Vec<Report> {
    board.advance(10);
    app.tick(&mut board.ports());
    board.link.take_reports()
}

fn temperatures(report: &Report) -> Vec<i16> {
    match report {
        Report::HistoricPoints(points) => points.iter().map(|p| p.temperature_centi / 100).collect(),
        other => panic!("expected point frame, got {:?}", other),
    }
}

#[test]
fn empty_store_yields_only_end() {
    let (mut app, mut board) = setup(8, 0);
    assert_eq!(request(&mut app, &mut board), vec![Report::HistoricEnd]);
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert!(step(&mut app, &mut board).is_empty());
}

#[test]
fn seven_samples_at_default_mtu_come_in_four_frames() {
    let (mut app, mut board) = setup(16, 7);
    assert!(request(&mut app, &mut board).is_empty());
    assert_eq!(app.engine().long_operation(), LongOperation::Historic);

    let mut sizes = Vec::new();
    let mut temps = Vec::new();
    loop {
        let reports = step(&mut app, &mut board);
        assert!(!reports.is_empty(), "transfer stalled");
        for r in &reports {
            if *r == Report::HistoricEnd {
                continue;
            }
            let t = temperatures(r);
            sizes.push(t.len());
            temps.extend(t);
        }
        if reports.last() == Some(&Report::HistoricEnd) {
            break;
        }
    }

    assert_eq!(sizes, vec![2, 2, 2, 1]);
    assert_eq!(temps, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert!(!board.history.is_open());
}

#[test]
fn every_frame_fits_the_link() {
    let (mut app, mut board) = setup(64, 50);
    request(&mut app, &mut board);
    let mut received = 0;
    for _ in 0..30 {
        for r in step(&mut app, &mut board) {
            if r != Report::HistoricEnd {
                received += temperatures(&r).len();
            }
        }
    }
    // MockLink refuses oversize frames, so a short count means one was dropped.
    assert_eq!(received, 50);
    assert_eq!(app.engine().long_operation(), LongOperation::None);
}

#[test]
fn wrapped_ring_is_sent_oldest_first() {
    let (mut app, mut board) = setup(4, 6);
    board.link.mtu = 185;
    request(&mut app, &mut board);
    let reports = step(&mut app, &mut board);
    assert_eq!(reports.len(), 2);
    assert_eq!(temperatures(&reports[0]), vec![2, 3, 4, 5]);
    assert_eq!(reports[1], Report::HistoricEnd);
}

#[test]
fn timestamps_are_back_dated_by_interval() {
    let (mut app, mut board) = setup(8, 3);
    board.link.mtu = 185;
    request(&mut app, &mut board);
    let reports = step(&mut app, &mut board);
    let Report::HistoricPoints(points) = &reports[0] else {
        panic!("expected points");
    };
    let ts: Vec<i32> = points.iter().map(|p| p.timestamp).collect();
    // Newest sample carries "now"; the interval is one minute.
    let now = SYNCED_AT as i32;
    assert_eq!(ts, vec![now - 120, now - 60, now]);
}

#[test]
fn repeated_request_does_not_restart() {
    let (mut app, mut board) = setup(16, 7);
    request(&mut app, &mut board);
    let first = step(&mut app, &mut board);
    assert_eq!(temperatures(&first[0]), vec![0, 1]);

    assert!(request(&mut app, &mut board).is_empty());
    let second = step(&mut app, &mut board);
    assert_eq!(temperatures(&second[0]), vec![2, 3]);
}

#[test]
fn ota_is_refused_during_transfer() {
    let (mut app, mut board) = setup(16, 7);
    request(&mut app, &mut board);
    app.handle_event(
        LinkEvent::frame(&[0xA0, 0x00, 0x10, 0x00, 0x00]),
        &mut board.ports(),
    );
    assert_eq!(
        board.link.take_reports(),
        vec![Report::Error(ErrorCode::Access)]
    );
    assert!(board.update.calls.is_empty());
}

#[test]
fn disconnect_aborts_without_touching_the_ring() {
    let (mut app, mut board) = setup(16, 7);
    request(&mut app, &mut board);
    step(&mut app, &mut board);

    board.link.connected = false;
    app.handle_event(LinkEvent::Disconnected, &mut board.ports());
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert!(!board.history.is_open());

    board.link.connected = true;
    assert!(step(&mut app, &mut board).is_empty());
    assert_eq!(board.history.count(), 7);
    assert_eq!(board.history.write_index(), 7);
}

#[test]
fn silent_link_loss_aborts_the_transfer() {
    let (mut app, mut board) = setup(16, 7);
    request(&mut app, &mut board);
    step(&mut app, &mut board);

    // No Disconnected event reaches the loop.
    board.link.connected = false;
    assert!(step(&mut app, &mut board).is_empty());
    assert!(!app.state().connected);
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert!(!board.history.is_open());
    assert_eq!(board.history.count(), 7);
}

#[test]
fn sampling_pauses_while_transfer_holds_the_store() {
    let (mut app, mut board) = setup(16, 7);
    app.update_sensor(Some(SensorReading {
        temperature: 21.0,
        humidity: 45.0,
    }));
    request(&mut app, &mut board);
    assert!(app.history_sample_due(120_000, -50).is_none());

    while app.engine().long_operation() == LongOperation::Historic {
        step(&mut app, &mut board);
    }
    assert!(app.history_sample_due(120_000, -50).is_some());
}
