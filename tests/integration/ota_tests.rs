//! Firmware update sessions end to end.

use medbox::app::service::AppService;
use medbox::app::state::DeviceState;
use medbox::config::DeviceConfig;
use medbox::rpc::channels::LinkEvent;
use medbox::rpc::codec::{ErrorCode, Report};
use medbox::rpc::engine::LongOperation;

use super::mock_hw::{MockBoard, UpdateCall};

fn connected() -> (AppService, MockBoard) {
    let mut board = MockBoard::new(16);
    board.link.connected = true;
    let mut app = AppService::new(DeviceConfig::default(), DeviceState::default());
    app.handle_event(LinkEvent::Connected { mtu: 23 }, &mut board.ports());
    (app, board)
}

fn write(app: &mut AppService, board: &mut MockBoard, frame: &[u8]) -> Vec<Report> {
    app.handle_event(LinkEvent::frame(frame), &mut board.ports());
    board.link.take_reports()
}

fn start_frame(size: u32) -> Vec<u8> {
    let mut f = vec![0xA0];
    f.extend_from_slice(&size.to_le_bytes());
    f
}

fn data_frame(chunk: &[u8]) -> Vec<u8> {
    let mut f = vec![0xA1];
    f.extend_from_slice(chunk);
    f
}

#[test]
fn full_update_commits_then_reboots_after_delay() {
    let (mut app, mut board) = connected();
    let image: Vec<u8> = (0..40u8).collect();

    assert_eq!(write(&mut app, &mut board, &start_frame(40)), vec![Report::Ack]);
    assert_eq!(app.engine().long_operation(), LongOperation::Ota);

    for chunk in image.chunks(19) {
        assert!(write(&mut app, &mut board, &data_frame(chunk)).is_empty());
    }
    assert_eq!(board.display.progress.last(), Some(&100));

    assert_eq!(write(&mut app, &mut board, &[0xA2]), vec![Report::Ack]);
    assert!(board.update.committed);
    assert_eq!(board.update.image, image);
    assert!(app.engine().reboot_pending());

    board.advance(500);
    app.tick(&mut board.ports());
    assert_eq!(board.system.reboots, 0);

    board.advance(500);
    app.tick(&mut board.ports());
    assert_eq!(board.system.reboots, 1);
}

#[test]
fn data_before_start_is_a_sequence_error() {
    let (mut app, mut board) = connected();
    assert_eq!(
        write(&mut app, &mut board, &data_frame(&[1, 2, 3])),
        vec![Report::Error(ErrorCode::WrongSequence)]
    );
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert!(board.update.calls.is_empty());
}

#[test]
fn end_before_start_is_a_sequence_error() {
    let (mut app, mut board) = connected();
    assert_eq!(
        write(&mut app, &mut board, &[0xA2]),
        vec![Report::Error(ErrorCode::WrongSequence)]
    );
}

#[test]
fn second_start_is_refused() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &start_frame(10));
    assert_eq!(
        write(&mut app, &mut board, &start_frame(10)),
        vec![Report::Error(ErrorCode::WrongSequence)]
    );
    assert_eq!(board.update.calls, vec![UpdateCall::Begin(10)]);
}

#[test]
fn overflow_aborts_with_length_error() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &start_frame(4));
    assert_eq!(
        write(&mut app, &mut board, &data_frame(&[0; 5])),
        vec![Report::Error(ErrorCode::Length)]
    );
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert_eq!(board.update.calls.last(), Some(&UpdateCall::Abort));
}

#[test]
fn short_image_is_rejected_at_end() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &start_frame(8));
    write(&mut app, &mut board, &data_frame(&[1, 2, 3]));
    assert_eq!(
        write(&mut app, &mut board, &[0xA2]),
        vec![Report::Error(ErrorCode::Access)]
    );
    assert!(!board.update.committed);
    assert!(!app.engine().reboot_pending());
}

#[test]
fn begin_failure_reports_access_error() {
    let (mut app, mut board) = connected();
    board.update.fail_begin = true;
    assert_eq!(
        write(&mut app, &mut board, &start_frame(1024)),
        vec![Report::Error(ErrorCode::Access)]
    );
    assert_eq!(app.engine().long_operation(), LongOperation::None);
}

#[test]
fn zero_length_image_follows_the_partition_contract() {
    let (mut app, mut board) = connected();
    assert_eq!(write(&mut app, &mut board, &start_frame(0)), vec![Report::Ack]);
    assert_eq!(write(&mut app, &mut board, &[0xA2]), vec![Report::Ack]);
    assert!(board.update.committed);

    let (mut app, mut board) = connected();
    board.update.fail_commit = true;
    write(&mut app, &mut board, &start_frame(0));
    assert_eq!(
        write(&mut app, &mut board, &[0xA2]),
        vec![Report::Error(ErrorCode::Access)]
    );
    assert_eq!(app.engine().long_operation(), LongOperation::None);
}

#[test]
fn historic_is_refused_during_update() {
    let (mut app, mut board) = connected();
    board.record(0, 3);
    write(&mut app, &mut board, &start_frame(100));
    assert_eq!(
        write(&mut app, &mut board, &[0x31]),
        vec![Report::Error(ErrorCode::Access)]
    );
    assert!(!board.history.is_open());
}

#[test]
fn disconnect_aborts_the_partition_write() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &start_frame(100));
    write(&mut app, &mut board, &data_frame(&[0xE9; 10]));

    board.link.connected = false;
    app.handle_event(LinkEvent::Disconnected, &mut board.ports());
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert_eq!(board.update.calls.last(), Some(&UpdateCall::Abort));
    assert!(!board.update.committed);
    assert!(board.link.sent.is_empty());
}

#[test]
fn silent_peer_times_out() {
    let (mut app, mut board) = connected();
    write(&mut app, &mut board, &start_frame(100));

    board.advance(29_000);
    app.tick(&mut board.ports());
    assert_eq!(app.engine().long_operation(), LongOperation::Ota);

    board.advance(2_000);
    app.tick(&mut board.ports());
    assert_eq!(app.engine().long_operation(), LongOperation::None);
    assert_eq!(
        board.link.take_reports(),
        vec![Report::Error(ErrorCode::Access)]
    );
}
