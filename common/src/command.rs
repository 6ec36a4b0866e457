use thiserror::Error;

use crate::{
    liveness::LivenessState,
    ports::RelayOutput,
    relay::{Effect, RelayState},
    types::{Edge, SwitchSource, TimeOfDay},
};

const ON_AT_PREFIX: &str = "on at";
const OFF_AT_PREFIX: &str = "off at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Switch(bool),
    SetPoint { edge: Edge, time: TimeOfDay },
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("no time given")]
    Empty,
    #[error("expected H:M or H.M")]
    MissingSeparator,
    #[error("`{0}` is not a decimal number")]
    InvalidNumber(String),
    #[error("hour {0} is out of range 0-23")]
    HourOutOfRange(u32),
    #[error("minute {0} is out of range 0-59")]
    MinuteOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("invalid {} time `{input}`: {source}", .edge.as_str())]
    InvalidTime {
        edge: Edge,
        input: String,
        source: TimeParseError,
    },
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let normalized = line.trim().to_ascii_lowercase();

    match normalized.as_str() {
        "on" => return Ok(Command::Switch(true)),
        "off" => return Ok(Command::Switch(false)),
        "ok" => return Ok(Command::Acknowledge),
        _ => {}
    }

    let (edge, literal) = if let Some(rest) = normalized.strip_prefix(ON_AT_PREFIX) {
        (Edge::On, rest)
    } else if let Some(rest) = normalized.strip_prefix(OFF_AT_PREFIX) {
        (Edge::Off, rest)
    } else {
        return Err(CommandError::UnknownCommand(line.trim().to_string()));
    };

    parse_time_of_day(literal)
        .map(|time| Command::SetPoint { edge, time })
        .map_err(|source| CommandError::InvalidTime {
            edge,
            input: literal.trim().to_string(),
            source,
        })
}

/// Parse `H:M` or `H.M`. Both parts are required; zero padding is optional.
pub fn parse_time_of_day(literal: &str) -> Result<TimeOfDay, TimeParseError> {
    let normalized = literal.trim().replace('.', ":");
    if normalized.is_empty() {
        return Err(TimeParseError::Empty);
    }

    let (hour, minute) = normalized
        .split_once(':')
        .ok_or(TimeParseError::MissingSeparator)?;
    let hour = parse_component(hour)?;
    let minute = parse_component(minute)?;

    if hour > 23 {
        return Err(TimeParseError::HourOutOfRange(hour));
    }
    if minute > 59 {
        return Err(TimeParseError::MinuteOutOfRange(minute));
    }

    // Both components were range-checked above.
    TimeOfDay::new(hour as u8, minute as u8).ok_or(TimeParseError::HourOutOfRange(hour))
}

fn parse_component(raw: &str) -> Result<u32, TimeParseError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeParseError::InvalidNumber(raw.to_string()));
    }
    raw.parse::<u32>()
        .map_err(|_| TimeParseError::InvalidNumber(raw.to_string()))
}

pub fn apply(
    line: &str,
    relay: &mut RelayState,
    liveness: &mut LivenessState,
    output: &mut impl RelayOutput,
    now_ms: u64,
) -> Effect {
    match parse_command(line) {
        Ok(Command::Switch(on)) => relay.drive(output, on, SwitchSource::Manual),
        Ok(Command::SetPoint { edge, time }) => {
            relay.set_set_point(edge, time);
            Effect::SetPointChanged { edge, time }
        }
        Ok(Command::Acknowledge) => {
            liveness.acknowledge(now_ms);
            Effect::Acknowledged
        }
        Err(CommandError::UnknownCommand(input)) => Effect::Rejected { input },
        Err(CommandError::InvalidTime {
            edge,
            input,
            source,
        }) => Effect::SetPointRejected {
            edge,
            input,
            reason: source,
        },
    }
}
