use serde::{Deserialize, Serialize};

const MAX_UTC_OFFSET_SECS: i32 = 14 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub watchdog_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub connect_poll_ms: u64,
    pub loop_interval_ms: u64,
    pub max_line_len: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: 300_000,
            reconnect_interval_ms: 10_000,
            connect_timeout_ms: 10_000,
            connect_poll_ms: 500,
            loop_interval_ms: 50,
            max_line_len: 64,
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.watchdog_timeout_ms = self.watchdog_timeout_ms.max(10_000);
        self.reconnect_interval_ms = self.reconnect_interval_ms.max(1_000);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(1_000, 60_000);
        self.connect_poll_ms = self.connect_poll_ms.clamp(10, self.connect_timeout_ms);
        self.loop_interval_ms = self.loop_interval_ms.clamp(1, 1_000);
        self.max_line_len = self.max_line_len.clamp(16, 256);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub ntp_server: String,
    pub utc_offset_secs: i32,
    pub ntp_poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            ntp_server: "pool.ntp.org".to_string(),
            utc_offset_secs: 19_800,
            ntp_poll_interval_ms: 60_000,
        }
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.ntp_server.trim().is_empty() {
            self.ntp_server = Self::default().ntp_server;
        }
        self.utc_offset_secs = self
            .utc_offset_secs
            .clamp(-MAX_UTC_OFFSET_SECS, MAX_UTC_OFFSET_SECS);
        self.ntp_poll_interval_ms = self.ntp_poll_interval_ms.max(15_000);
    }

    pub fn has_station_credentials(&self) -> bool {
        !self.wifi_ssid.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayHardwareConfig {
    pub relay_pin: i32,
    pub active_low: bool,
}

impl Default for RelayHardwareConfig {
    fn default() -> Self {
        Self {
            relay_pin: 5,
            active_low: false,
        }
    }
}

impl RelayHardwareConfig {
    pub fn sanitize(&mut self) {
        if self.relay_pin < 0 {
            self.relay_pin = 5;
        }
    }

    pub fn level_for(&self, energized: bool) -> bool {
        energized != self.active_low
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub control: ControlConfig,
    pub network: NetworkConfig,
    pub relay: RelayHardwareConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.control.sanitize();
        self.network.sanitize();
        self.relay.sanitize();
    }
}
