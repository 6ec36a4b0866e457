use std::{
    net::IpAddr,
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::gpio::{Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::NON_BLOCK,
        gpio::{AnyIOPin, AnyOutputPin},
        modem::Modem,
        prelude::Peripherals,
        uart::{config::Config as UartConfig, UartDriver},
    },
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sntp::{EspSntp, SntpConf},
    wifi::EspWifi,
};
use log::{info, warn};

use relay_timer_common::{
    Clock, ControlLoop, LoopStatus, Network, NetworkConfig, RelayHardwareConfig, RelayOutput,
    RuntimeConfig, SerialInput, SystemReset, TimeOfDay, TimeSource,
};

// Must exceed the bounded connect wait.
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const EPOCH_2020: i64 = 1_577_836_800;

struct EspBoard {
    wifi: EspWifi<'static>,
    sntp: Option<EspSntp<'static>>,
    network: NetworkConfig,
    relay_pin: PinDriver<'static, AnyOutputPin, Output>,
    relay: RelayHardwareConfig,
    uart: UartDriver<'static>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    info!(
        "config: ssid=`{}`, ntp=`{}`, utc_offset={}s, relay=GPIO{}",
        runtime.network.wifi_ssid,
        runtime.network.ntp_server,
        runtime.network.utc_offset_secs,
        runtime.relay.relay_pin,
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let relay_pin = unsafe { PinDriver::output(AnyOutputPin::new(runtime.relay.relay_pin)) }
        .with_context(|| format!("relay GPIO{} unavailable", runtime.relay.relay_pin))?;

    let uart = UartDriver::new(
        peripherals.uart0,
        peripherals.pins.gpio1,
        peripherals.pins.gpio3,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default(),
    )
    .context("failed to open UART0")?;

    let wifi = start_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    if let Err(err) = add_current_task_to_watchdog() {
        warn!("failed to register control loop with watchdog: {err:#}");
    }

    let mut board = EspBoard {
        wifi,
        sntp: None,
        network: runtime.network.clone(),
        relay_pin,
        relay: runtime.relay.clone(),
        uart,
    };

    let mut control = ControlLoop::new(runtime.control.clone(), board.now_ms());
    control.boot(&mut board);

    loop {
        feed_watchdog();
        if control.tick(&mut board) == LoopStatus::Restarting {
            // esp_restart does not return; keep the task alive if it somehow does.
            thread::sleep(Duration::from_secs(1));
            continue;
        }
        thread::sleep(Duration::from_millis(runtime.control.loop_interval_ms));
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn start_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;

    if !network.has_station_credentials() {
        warn!("wifi credentials missing; build with WIFI_SSID and WIFI_PASS set");
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, station `{}`", network.wifi_ssid);
    Ok(wifi)
}

impl Clock for EspBoard {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

impl Network for EspBoard {
    fn begin_connect(&mut self) -> anyhow::Result<()> {
        if !self.network.has_station_credentials() {
            return Err(anyhow!("no wifi credentials configured"));
        }
        // Drop any half-open association before retrying.
        let _ = self.wifi.disconnect();
        self.wifi.connect().context("wifi connect request failed")
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| IpAddr::V4(info.ip))
    }
}

impl TimeSource for EspBoard {
    fn begin_sync(&mut self) {
        if self.sntp.is_some() {
            let restarted = unsafe { esp_idf_svc::sys::sntp_restart() };
            if !restarted {
                warn!("SNTP restart request ignored");
            }
            return;
        }

        let interval_ms = u32::try_from(self.network.ntp_poll_interval_ms).unwrap_or(u32::MAX);
        unsafe { esp_idf_svc::sys::sntp_set_sync_interval(interval_ms) };

        let server = self.network.ntp_server.clone();
        let mut conf = SntpConf::default();
        conf.servers[0] = server.as_str();
        match EspSntp::new(&conf) {
            Ok(sntp) => {
                info!("SNTP started against `{server}`");
                self.sntp = Some(sntp);
            }
            Err(err) => warn!("failed to start SNTP: {err:?}"),
        }
    }

    fn update(&mut self) -> bool {
        self.sntp.is_some() && Utc::now().timestamp() >= EPOCH_2020
    }

    fn time_of_day(&self) -> Option<TimeOfDay> {
        TimeOfDay::at_offset(Utc::now(), self.network.utc_offset_secs)
    }
}

impl RelayOutput for EspBoard {
    fn set_relay(&mut self, energized: bool) -> anyhow::Result<()> {
        let result = if self.relay.level_for(energized) {
            self.relay_pin.set_high()
        } else {
            self.relay_pin.set_low()
        };
        result.with_context(|| format!("failed to drive relay GPIO{}", self.relay.relay_pin))
    }
}

impl SerialInput for EspBoard {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0_u8; 1];
        match self.uart.read(&mut byte, NON_BLOCK) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}

impl SystemReset for EspBoard {
    fn restart(&mut self) {
        // Let the log line reach the console first.
        thread::sleep(Duration::from_millis(100));
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
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
