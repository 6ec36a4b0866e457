use log::{error, info, warn};

use crate::{
    command,
    config::ControlConfig,
    line_buffer::{LineBuffer, LineEvent},
    liveness::{LivenessState, LivenessSupervisor},
    ports::Board,
    relay::{Effect, RelayState},
    schedule,
    types::{ConnectionStatus, SwitchSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    Restarting,
}

#[derive(Debug, Clone)]
pub struct ControlLoop {
    config: ControlConfig,
    relay: RelayState,
    liveness: LivenessSupervisor,
    input: LineBuffer,
    restart_ordered: bool,
}

impl ControlLoop {
    pub fn new(config: ControlConfig, now_ms: u64) -> Self {
        Self {
            liveness: LivenessSupervisor::new(&config, now_ms),
            input: LineBuffer::new(config.max_line_len),
            relay: RelayState::new(),
            restart_ordered: false,
            config,
        }
    }

    pub fn relay(&self) -> &RelayState {
        &self.relay
    }

    pub fn liveness(&self) -> &LivenessState {
        self.liveness.state()
    }

    pub fn is_restart_ordered(&self) -> bool {
        self.restart_ordered
    }

    /// Deassert the relay and make the first bounded connect attempt.
    pub fn boot(&mut self, board: &mut impl Board) -> ConnectionStatus {
        info!("system booting");
        if let Err(err) = board.set_relay(false) {
            warn!("failed to deassert relay at boot: {err:#}");
        }

        info!("starting wifi");
        let now_ms = board.now_ms();
        self.liveness.record_reconnect_attempt(now_ms);
        self.connect(board)
    }

    pub fn tick(&mut self, board: &mut impl Board) -> LoopStatus {
        if self.restart_ordered {
            return LoopStatus::Restarting;
        }

        let now_ms = board.now_ms();
        if self.liveness.watchdog_expired(now_ms) {
            error!(
                "watchdog timeout: no acknowledgement for {}s, restarting",
                self.liveness.since_ack_ms(now_ms) / 1000
            );
            self.restart_ordered = true;
            board.restart();
            return LoopStatus::Restarting;
        }

        let status = ConnectionStatus::from_connected(board.is_connected());
        if self.liveness.reconnect_due(status, now_ms) {
            self.liveness.record_reconnect_attempt(now_ms);
            warn!("wifi disconnected, trying to reconnect");
            self.connect(board);
        }

        if board.is_connected() && board.update() {
            if let Some(now) = board.time_of_day() {
                if let Some(effect) = schedule::tick(now, &mut self.relay, board) {
                    self.report(&effect);
                }
            }
        }

        self.drain_input(board);
        LoopStatus::Running
    }

    fn connect(&mut self, board: &mut impl Board) -> ConnectionStatus {
        info!("connecting to wifi");
        if let Err(err) = board.begin_connect() {
            warn!("wifi connect request failed: {err:#}");
            return ConnectionStatus::Disconnected;
        }

        let started_ms = board.now_ms();
        while !board.is_connected()
            && board.now_ms().saturating_sub(started_ms) < self.config.connect_timeout_ms
        {
            board.delay_ms(self.config.connect_poll_ms);
        }

        if !board.is_connected() {
            warn!(
                "wifi connection failed after {}ms",
                board.now_ms().saturating_sub(started_ms)
            );
            return ConnectionStatus::Disconnected;
        }

        match board.local_ip() {
            Some(ip) => info!("wifi connected, ip address {ip}"),
            None => info!("wifi connected"),
        }

        board.begin_sync();
        match (board.update(), board.time_of_day()) {
            (true, Some(now)) => info!("current time synced: {now}"),
            _ => warn!("time source not synchronized yet"),
        }

        ConnectionStatus::Connected
    }

    fn drain_input(&mut self, board: &mut impl Board) {
        while let Some(byte) = board.read_byte() {
            match self.input.push(byte) {
                Some(LineEvent::Line(line)) => {
                    let now_ms = board.now_ms();
                    let effect = command::apply(
                        &line,
                        &mut self.relay,
                        self.liveness.state_mut(),
                        board,
                        now_ms,
                    );
                    self.report(&effect);
                }
                Some(LineEvent::Overflow) => warn!(
                    "input line longer than {} bytes discarded",
                    self.config.max_line_len
                ),
                None => {}
            }
        }
    }

    fn report(&self, effect: &Effect) {
        match effect {
            Effect::Switched {
                on,
                source: SwitchSource::Manual,
            } => info!("relay manually turned {}", on_off(*on)),
            Effect::Switched {
                on,
                source: SwitchSource::Schedule,
            } => info!("relay turned {} via schedule", on_off(*on)),
            Effect::SwitchFailed { on, source } => error!(
                "relay could not be turned {} ({})",
                on_off(*on),
                source.as_str()
            ),
            Effect::SetPointChanged { edge, time } => {
                info!("relay {} time set to {time}", edge.as_str())
            }
            Effect::SetPointRejected {
                edge,
                input,
                reason,
            } => match self.relay.set_point(*edge) {
                Some(kept) => warn!(
                    "invalid {} time `{input}`: {reason}; keeping {kept}",
                    edge.as_str()
                ),
                None => warn!(
                    "invalid {} time `{input}`: {reason}; still unset",
                    edge.as_str()
                ),
            },
            Effect::Acknowledged => info!("ok received, watchdog reset"),
            Effect::Rejected { input } => warn!("invalid command `{input}`"),
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
