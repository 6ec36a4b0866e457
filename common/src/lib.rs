pub mod command;
pub mod config;
pub mod control_loop;
pub mod line_buffer;
pub mod liveness;
pub mod ports;
pub mod relay;
pub mod schedule;
pub mod types;

pub use command::{parse_command, parse_time_of_day, Command, CommandError, TimeParseError};
pub use config::{ControlConfig, NetworkConfig, RelayHardwareConfig, RuntimeConfig};
pub use control_loop::{ControlLoop, LoopStatus};
pub use line_buffer::{LineBuffer, LineEvent};
pub use liveness::{LivenessState, LivenessSupervisor};
pub use ports::{Board, Clock, Network, RelayOutput, SerialInput, SystemReset, TimeSource};
pub use relay::{Effect, RelayState};
pub use types::{ConnectionStatus, Edge, SwitchSource, TimeOfDay};
