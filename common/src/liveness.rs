use crate::{config::ControlConfig, types::ConnectionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessState {
    pub last_ack_ms: u64,
    pub last_reconnect_attempt_ms: Option<u64>,
}

impl LivenessState {
    pub fn new(now_ms: u64) -> Self {
        Self {
            last_ack_ms: now_ms,
            last_reconnect_attempt_ms: None,
        }
    }

    pub fn acknowledge(&mut self, now_ms: u64) {
        self.last_ack_ms = now_ms;
    }
}

#[derive(Debug, Clone)]
pub struct LivenessSupervisor {
    watchdog_timeout_ms: u64,
    reconnect_interval_ms: u64,
    state: LivenessState,
}

impl LivenessSupervisor {
    pub fn new(config: &ControlConfig, now_ms: u64) -> Self {
        Self {
            watchdog_timeout_ms: config.watchdog_timeout_ms,
            reconnect_interval_ms: config.reconnect_interval_ms,
            state: LivenessState::new(now_ms),
        }
    }

    pub fn state(&self) -> &LivenessState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut LivenessState {
        &mut self.state
    }

    pub fn since_ack_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state.last_ack_ms)
    }

    pub fn watchdog_expired(&self, now_ms: u64) -> bool {
        self.since_ack_ms(now_ms) > self.watchdog_timeout_ms
    }

    pub fn reconnect_due(&self, status: ConnectionStatus, now_ms: u64) -> bool {
        if status == ConnectionStatus::Connected {
            return false;
        }
        self.state
            .last_reconnect_attempt_ms
            .map(|last| now_ms.saturating_sub(last) >= self.reconnect_interval_ms)
            .unwrap_or(true)
    }

    pub fn record_reconnect_attempt(&mut self, now_ms: u64) {
        self.state.last_reconnect_attempt_ms = Some(now_ms);
    }
}
