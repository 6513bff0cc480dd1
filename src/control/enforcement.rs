//! Intent enforcement as a pure function (spec §9: "implement it as a pure
//! function over tagged enums, not as nested conditionals").

use crate::player_data::{PlayerState, UserIntention};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnforcementCommand {
    None,
    Stop,
    Pause,
    Play,
}

/// The 6×4 decision table from §4.I: given what the user wants and what the
/// player is currently doing, what command (if any) closes the gap.
pub fn enforce(intent: UserIntention, player_state: PlayerState) -> EnforcementCommand {
    use EnforcementCommand as Cmd;
    use PlayerState::*;
    use UserIntention::*;

    match intent {
        Nothing => Cmd::None,
        Stopping => match player_state {
            Buffering | Playing | Paused => Cmd::Stop,
            Stopped => Cmd::None,
        },
        Pausing | SkippingPaused => match player_state {
            Stopped | Buffering | Playing => Cmd::Pause,
            Paused => Cmd::None,
        },
        Listening | SkippingLive => match player_state {
            Stopped | Paused => Cmd::Play,
            Buffering | Playing => Cmd::None,
        },
    }
}
