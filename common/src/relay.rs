use log::warn;

use crate::{
    command::TimeParseError,
    ports::RelayOutput,
    types::{Edge, SwitchSource, TimeOfDay},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Switched { on: bool, source: SwitchSource },
    SwitchFailed { on: bool, source: SwitchSource },
    SetPointChanged { edge: Edge, time: TimeOfDay },
    SetPointRejected {
        edge: Edge,
        input: String,
        reason: TimeParseError,
    },
    Acknowledged,
    Rejected { input: String },
}

// `is_on` always equals the last level successfully written to the pin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayState {
    is_on: bool,
    on_time: Option<TimeOfDay>,
    off_time: Option<TimeOfDay>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn on_time(&self) -> Option<TimeOfDay> {
        self.on_time
    }

    pub fn off_time(&self) -> Option<TimeOfDay> {
        self.off_time
    }

    pub fn set_point(&self, edge: Edge) -> Option<TimeOfDay> {
        match edge {
            Edge::On => self.on_time,
            Edge::Off => self.off_time,
        }
    }

    pub fn set_set_point(&mut self, edge: Edge, time: TimeOfDay) {
        match edge {
            Edge::On => self.on_time = Some(time),
            Edge::Off => self.off_time = Some(time),
        }
    }

    pub fn drive(
        &mut self,
        output: &mut impl RelayOutput,
        on: bool,
        source: SwitchSource,
    ) -> Effect {
        match output.set_relay(on) {
            Ok(()) => {
                self.is_on = on;
                Effect::Switched { on, source }
            }
            Err(err) => {
                warn!(
                    "relay write ({}, {}) failed: {err:#}",
                    if on { "on" } else { "off" },
                    source.as_str()
                );
                Effect::SwitchFailed { on, source }
            }
        }
    }
}
