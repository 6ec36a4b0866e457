use std::{
    net::{IpAddr, ToSocketAddrs, UdpSocket},
    path::Path,
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::Utc;
use tokio::{io::AsyncReadExt, sync::mpsc, time::{Interval, MissedTickBehavior}};
use tracing::{debug, info, warn};

use relay_timer_common::{
    Clock, ControlLoop, LoopStatus, Network, RelayHardwareConfig, RelayOutput, RuntimeConfig,
    SerialInput, SystemReset, TimeOfDay, TimeSource,
};

const NTP_PORT: u16 = 123;
const LINK_RECHECK_MS: u64 = 5_000;

// stdin stands in for the serial line; connectivity is UDP reachability
// of the NTP server.
struct HostBoard {
    ntp_server: String,
    utc_offset_secs: i32,
    relay: RelayHardwareConfig,
    relay_level: Option<bool>,
    link_up: bool,
    local_ip: Option<IpAddr>,
    last_probe_ms: Option<u64>,
    time_synced: bool,
    serial: mpsc::UnboundedReceiver<u8>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().await;
    info!(
        "config loaded: ntp=`{}`, utc_offset={}s, watchdog={}s",
        runtime.network.ntp_server,
        runtime.network.utc_offset_secs,
        runtime.control.watchdog_timeout_ms / 1000,
    );

    let (serial_tx, serial_rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(serial_tx);

    let mut board = HostBoard::new(&runtime, serial_rx);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let mut control = ControlLoop::new(runtime.control.clone(), board.now_ms());
        tokio::task::block_in_place(|| control.boot(&mut board));

        let mut interval = loop_interval(runtime.control.loop_interval_ms);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                result = &mut shutdown => {
                    result.context("failed to listen for shutdown signal")?;
                    info!("shutting down, releasing relay");
                    if let Err(err) = board.set_relay(false) {
                        warn!("failed to release relay on shutdown: {err:#}");
                    }
                    return Ok(());
                }
            }

            let status = tokio::task::block_in_place(|| control.tick(&mut board));
            if status == LoopStatus::Restarting {
                break;
            }
        }

        board.reset_for_restart();
        info!("controller restarted");
    }
}

// A blocking connect must not be followed by a burst of catch-up ticks.
fn loop_interval(period_ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<u8>) {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0_u8; 256];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    info!("stdin closed, serial input disabled");
                    return;
                }
                Ok(read) => {
                    for &byte in &buf[..read] {
                        if tx.send(byte).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!("stdin read error: {err}");
                    return;
                }
            }
        }
    });
}

async fn load_runtime_config() -> RuntimeConfig {
    let mut runtime = match std::env::var("RELAY_TIMER_CONFIG") {
        Ok(path) => read_config_file(Path::new(&path))
            .await
            .unwrap_or_else(|err| {
                warn!("failed to load runtime config from `{path}`: {err:#}");
                RuntimeConfig::default()
            }),
        Err(_) => RuntimeConfig::default(),
    };
    apply_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();
    runtime
}

async fn read_config_file(path: &Path) -> anyhow::Result<RuntimeConfig> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).context("invalid runtime config json")
}

fn apply_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(ssid) = lookup("WIFI_SSID") {
        runtime.network.wifi_ssid = ssid;
    }
    if let Some(pass) = lookup("WIFI_PASS") {
        runtime.network.wifi_pass = pass;
    }
    if let Some(server) = lookup("NTP_SERVER") {
        runtime.network.ntp_server = server;
    }
    if let Some(offset) = lookup("UTC_OFFSET_SECS") {
        match offset.trim().parse::<i32>() {
            Ok(secs) => runtime.network.utc_offset_secs = secs,
            Err(err) => warn!("ignoring UTC_OFFSET_SECS=`{offset}`: {err}"),
        }
    }
}

impl HostBoard {
    fn new(runtime: &RuntimeConfig, serial: mpsc::UnboundedReceiver<u8>) -> Self {
        Self {
            ntp_server: runtime.network.ntp_server.clone(),
            utc_offset_secs: runtime.network.utc_offset_secs,
            relay: runtime.relay.clone(),
            relay_level: None,
            link_up: false,
            local_ip: None,
            last_probe_ms: None,
            time_synced: false,
            serial,
        }
    }

    fn reset_for_restart(&mut self) {
        self.time_synced = false;
        self.last_probe_ms = None;
    }

    fn probe_link(&mut self) {
        self.last_probe_ms = Some(self.now_ms());
        match probe_ntp_route(&self.ntp_server) {
            Ok(ip) => {
                self.link_up = true;
                self.local_ip = Some(ip);
            }
            Err(err) => {
                if self.link_up {
                    warn!("network probe failed: {err:#}");
                }
                self.link_up = false;
                self.local_ip = None;
            }
        }
    }
}

fn probe_ntp_route(server: &str) -> anyhow::Result<IpAddr> {
    let addr = (server, NTP_PORT)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve `{server}`"))?
        .next()
        .with_context(|| format!("no address for `{server}`"))?;
    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).context("failed to bind probe socket")?;
    socket
        .connect(addr)
        .with_context(|| format!("no route to {addr}"))?;
    Ok(socket.local_addr()?.ip())
}

impl Clock for HostBoard {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn delay_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

impl Network for HostBoard {
    fn begin_connect(&mut self) -> anyhow::Result<()> {
        self.probe_link();
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let due = self
            .last_probe_ms
            .map(|last| self.now_ms().saturating_sub(last) >= LINK_RECHECK_MS)
            .unwrap_or(true);
        if due {
            self.probe_link();
        }
        self.link_up
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip
    }
}

impl TimeSource for HostBoard {
    // The host clock is disciplined by the operating system.
    fn begin_sync(&mut self) {
        self.time_synced = true;
    }

    fn update(&mut self) -> bool {
        self.time_synced
    }

    fn time_of_day(&self) -> Option<TimeOfDay> {
        TimeOfDay::at_offset(Utc::now(), self.utc_offset_secs)
    }
}

impl RelayOutput for HostBoard {
    fn set_relay(&mut self, energized: bool) -> anyhow::Result<()> {
        let level = self.relay.level_for(energized);
        if self.relay_level != Some(level) {
            let level_name = if level { "HIGH" } else { "LOW" };
            debug!(pin = self.relay.relay_pin, level = level_name, "relay gpio write");
        }
        self.relay_level = Some(level);
        Ok(())
    }
}

impl SerialInput for HostBoard {
    fn read_byte(&mut self) -> Option<u8> {
        self.serial.try_recv().ok()
    }
}

impl SystemReset for HostBoard {
    fn restart(&mut self) {
        warn!("restart requested, reinitializing controller state");
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
