use pretty_assertions::assert_eq;
use relay_timer_common::{
    ConnectionStatus, ControlConfig, ControlLoop, LoopStatus, RelayState, TimeOfDay,
};

use crate::sim_board::SimBoard;

fn booted(board: &mut SimBoard) -> ControlLoop {
    let mut control = ControlLoop::new(ControlConfig::default(), board.now_ms);
    control.boot(board);
    control
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_deasserts_relay_and_syncs_time() {
    let mut board = SimBoard::online(1_500);
    board.set_time(7, 15);

    let mut control = ControlLoop::new(ControlConfig::default(), 0);
    let status = control.boot(&mut board);

    assert_eq!(status, ConnectionStatus::Connected);
    assert_eq!(board.relay_writes, vec![false]);
    assert_eq!(board.connect_requests, 1);
    assert_eq!(board.sync_starts, 1);
    // Polled every 500ms until the link came up.
    assert_eq!(board.now_ms, 1_500);
}

#[test]
fn boot_connect_is_bounded() {
    let mut board = SimBoard::offline();

    let mut control = ControlLoop::new(ControlConfig::default(), 0);
    let status = control.boot(&mut board);

    assert_eq!(status, ConnectionStatus::Disconnected);
    assert_eq!(board.now_ms, 10_000);
    assert_eq!(board.sync_starts, 0);
    assert!(!control.relay().is_on());
}

// ── Schedule ──────────────────────────────────────────────────

#[test]
fn daily_schedule_switches_relay_on_and_off() {
    let mut board = SimBoard::online(0);
    board.set_time(5, 59);
    let mut control = booted(&mut board);

    board.send("off at 22:30\n");
    control.tick(&mut board);
    board.send("on at 06:00\n");
    control.tick(&mut board);

    assert_eq!(control.relay().off_time(), TimeOfDay::new(22, 30));
    assert_eq!(control.relay().on_time(), TimeOfDay::new(6, 0));
    assert!(!control.relay().is_on());

    board.set_time(6, 0);
    control.tick(&mut board);
    assert!(control.relay().is_on());
    assert_eq!(board.relay_level(), Some(true));

    // Same minute again: no second write.
    control.tick(&mut board);
    assert_eq!(board.relay_writes, vec![false, true]);

    board.set_time(22, 30);
    control.tick(&mut board);
    assert!(!control.relay().is_on());
    assert_eq!(board.relay_writes, vec![false, true, false]);
}

#[test]
fn equal_set_points_switch_once_per_minute() {
    let mut board = SimBoard::online(0);
    board.set_time(6, 4);
    let mut control = booted(&mut board);

    board.send("On At 6.5\noff at 6:05\n");
    control.tick(&mut board);

    board.set_time(6, 5);
    for _ in 0..6 {
        control.tick(&mut board);
    }

    assert!(control.relay().is_on());
    assert_eq!(board.relay_writes, vec![false, true]);
}

#[test]
fn schedule_waits_for_connectivity() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);
    board.send("on at 6:00\n");
    control.tick(&mut board);

    board.drop_link();
    board.connect_succeeds = false;
    board.set_time(6, 0);
    control.tick(&mut board);
    assert!(!control.relay().is_on());

    board.connect_succeeds = true;
    board.advance(10_000);
    control.tick(&mut board);
    assert!(control.relay().is_on());
}

#[test]
fn commands_apply_after_schedule_in_same_iteration() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);
    board.send("on at 6:00\n");
    control.tick(&mut board);

    board.set_time(6, 0);
    board.send("off\n");
    control.tick(&mut board);

    assert_eq!(board.relay_writes, vec![false, true, false]);
    assert!(!control.relay().is_on());
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn invalid_input_leaves_state_untouched() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    board.send("toggle\non at 25:00\noff at 7\n");
    control.tick(&mut board);

    assert_eq!(control.relay(), &RelayState::new());
    assert_eq!(board.relay_writes, vec![false]);
}

#[test]
fn partial_line_completes_on_later_iteration() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    board.send("O");
    control.tick(&mut board);
    assert_eq!(board.unread_serial(), 0);
    assert!(!control.relay().is_on());

    board.send("n\r\n");
    control.tick(&mut board);
    assert!(control.relay().is_on());
}

#[test]
fn overlong_line_is_discarded() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    board.send(&"x".repeat(100));
    board.send("\n on \n");
    control.tick(&mut board);

    assert!(control.relay().is_on());
    assert_eq!(board.relay_writes, vec![false, true]);
}

// ── Watchdog ──────────────────────────────────────────────────

#[test]
fn watchdog_orders_restart_exactly_once() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    board.advance(300_000);
    assert_eq!(control.tick(&mut board), LoopStatus::Running);
    assert_eq!(board.restarts, 0);

    board.advance(1);
    assert_eq!(control.tick(&mut board), LoopStatus::Restarting);
    assert_eq!(board.restarts, 1);

    for _ in 0..3 {
        board.advance(1_000);
        assert_eq!(control.tick(&mut board), LoopStatus::Restarting);
    }
    assert_eq!(board.restarts, 1);
    assert!(control.is_restart_ordered());
}

#[test]
fn acknowledgements_keep_device_running() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    for _ in 0..10 {
        board.advance(240_000);
        board.send("ok\n");
        assert_eq!(control.tick(&mut board), LoopStatus::Running);
    }

    assert_eq!(board.restarts, 0);
    assert_eq!(control.liveness().last_ack_ms, board.now_ms);
}

#[test]
fn restart_stops_command_processing() {
    let mut board = SimBoard::online(0);
    let mut control = booted(&mut board);

    board.advance(300_001);
    control.tick(&mut board);

    board.send("on\n");
    control.tick(&mut board);

    assert!(!control.relay().is_on());
    assert_eq!(board.unread_serial(), 3);
}

// ── Connectivity ──────────────────────────────────────────────

#[test]
fn reconnect_attempts_are_rate_limited() {
    let mut board = SimBoard::offline();
    board.connect_request_fails = true;
    let mut control = booted(&mut board);
    assert_eq!(board.connect_requests, 1);

    board.advance(5_000);
    control.tick(&mut board);
    board.advance(4_999);
    control.tick(&mut board);
    assert_eq!(board.connect_requests, 1);

    board.advance(1);
    control.tick(&mut board);
    assert_eq!(board.connect_requests, 2);
}

#[test]
fn reconnect_resynchronizes_time() {
    let mut board = SimBoard::online(0);
    board.set_time(12, 0);
    let mut control = booted(&mut board);
    assert_eq!(board.sync_starts, 1);

    board.drop_link();
    control.tick(&mut board);
    assert_eq!(board.connect_requests, 1);

    board.advance(10_000);
    control.tick(&mut board);
    assert_eq!(board.connect_requests, 2);
    assert_eq!(board.sync_starts, 2);
}

#[test]
fn offline_device_stays_up_while_acknowledged() {
    let mut board = SimBoard::offline();
    board.connect_request_fails = true;
    let mut control = booted(&mut board);

    for _ in 0..20 {
        board.advance(60_000);
        board.send("ok\n");
        assert_eq!(control.tick(&mut board), LoopStatus::Running);
    }

    assert_eq!(board.restarts, 0);
    assert_eq!(board.connect_requests, 21);
}

#[test]
fn offline_device_restarts_without_acknowledgement() {
    let mut board = SimBoard::offline();
    board.connect_request_fails = true;
    let mut control = booted(&mut board);

    board.advance(300_001);
    assert_eq!(control.tick(&mut board), LoopStatus::Restarting);
    assert_eq!(board.restarts, 1);
}
