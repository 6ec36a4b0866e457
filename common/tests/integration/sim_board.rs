//! Simulated board for integration tests.
//!
//! The clock only moves when a test advances it or when the control loop
//! sleeps in `delay_ms`, so connect timeouts run instantly.

use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr},
};

use relay_timer_common::{
    Clock, Network, RelayOutput, SerialInput, SystemReset, TimeOfDay, TimeSource,
};

pub struct SimBoard {
    pub now_ms: u64,
    pub connected: bool,
    pub connect_succeeds: bool,
    pub connect_request_fails: bool,
    pub connect_delay_ms: u64,
    pub connect_requests: u32,
    pub sync_starts: u32,
    pub time: Option<TimeOfDay>,
    pub relay_writes: Vec<bool>,
    pub restarts: u32,
    serial: VecDeque<u8>,
    pending_connect_at: Option<u64>,
    sync_started: bool,
}

#[allow(dead_code)]
impl SimBoard {
    pub fn online(connect_delay_ms: u64) -> Self {
        Self {
            now_ms: 0,
            connected: false,
            connect_succeeds: true,
            connect_request_fails: false,
            connect_delay_ms,
            connect_requests: 0,
            sync_starts: 0,
            time: None,
            relay_writes: Vec::new(),
            restarts: 0,
            serial: VecDeque::new(),
            pending_connect_at: None,
            sync_started: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            connect_succeeds: false,
            ..Self::online(0)
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    pub fn set_time(&mut self, hour: u8, minute: u8) {
        self.time = TimeOfDay::new(hour, minute);
    }

    pub fn send(&mut self, text: &str) {
        self.serial.extend(text.bytes());
    }

    pub fn drop_link(&mut self) {
        self.connected = false;
        self.pending_connect_at = None;
    }

    pub fn relay_level(&self) -> Option<bool> {
        self.relay_writes.last().copied()
    }

    pub fn unread_serial(&self) -> usize {
        self.serial.len()
    }
}

impl Clock for SimBoard {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

impl Network for SimBoard {
    fn begin_connect(&mut self) -> anyhow::Result<()> {
        self.connect_requests += 1;
        if self.connect_request_fails {
            anyhow::bail!("radio busy");
        }
        if self.connect_succeeds {
            self.pending_connect_at = Some(self.now_ms + self.connect_delay_ms);
        }
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        if let Some(at) = self.pending_connect_at {
            if self.now_ms >= at {
                self.connected = true;
                self.pending_connect_at = None;
            }
        }
        self.connected
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.connected
            .then_some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)))
    }
}

impl TimeSource for SimBoard {
    fn begin_sync(&mut self) {
        self.sync_starts += 1;
        self.sync_started = true;
    }

    fn update(&mut self) -> bool {
        self.sync_started && self.time.is_some()
    }

    fn time_of_day(&self) -> Option<TimeOfDay> {
        self.time
    }
}

impl RelayOutput for SimBoard {
    fn set_relay(&mut self, energized: bool) -> anyhow::Result<()> {
        self.relay_writes.push(energized);
        Ok(())
    }
}

impl SerialInput for SimBoard {
    fn read_byte(&mut self) -> Option<u8> {
        self.serial.pop_front()
    }
}

impl SystemReset for SimBoard {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}
