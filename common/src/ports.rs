use std::net::IpAddr;

use crate::types::TimeOfDay;

pub trait Clock {
    fn now_ms(&self) -> u64;

    // Only used by the bounded connect wait.
    fn delay_ms(&mut self, ms: u64);
}

pub trait Network {
    fn begin_connect(&mut self) -> anyhow::Result<()>;

    fn is_connected(&mut self) -> bool;

    fn local_ip(&self) -> Option<IpAddr>;
}

pub trait TimeSource {
    fn begin_sync(&mut self);

    /// `true` once the clock holds a usable synchronized time.
    fn update(&mut self) -> bool;

    fn time_of_day(&self) -> Option<TimeOfDay>;
}

pub trait RelayOutput {
    fn set_relay(&mut self, energized: bool) -> anyhow::Result<()>;
}

pub trait SerialInput {
    fn read_byte(&mut self) -> Option<u8>;
}

pub trait SystemReset {
    // Real hardware never returns from this call.
    fn restart(&mut self);
}

pub trait Board: Clock + Network + TimeSource + RelayOutput + SerialInput + SystemReset {}

impl<T> Board for T where T: Clock + Network + TimeSource + RelayOutput + SerialInput + SystemReset {}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingOutput {
    pub writes: Vec<bool>,
    pub fail: bool,
}

#[cfg(test)]
impl RelayOutput for RecordingOutput {
    fn set_relay(&mut self, energized: bool) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("relay pin write failed");
        }
        self.writes.push(energized);
        Ok(())
    }
}
