use crate::{
    ports::RelayOutput,
    relay::{Effect, RelayState},
    types::{SwitchSource, TimeOfDay},
};

// ON wins when both set-points name the same minute.
pub fn tick(
    now: TimeOfDay,
    relay: &mut RelayState,
    output: &mut impl RelayOutput,
) -> Option<Effect> {
    if relay.on_time() == Some(now) && !relay.is_on() {
        return Some(relay.drive(output, true, SwitchSource::Schedule));
    }

    if relay.off_time() == Some(now) && relay.on_time() != Some(now) && relay.is_on() {
        return Some(relay.drive(output, false, SwitchSource::Schedule));
    }

    None
}
