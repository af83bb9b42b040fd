use serde::{Deserialize, Serialize};
use crate::model::{GuildId, Medal, Participant, NO_GUILD};

/// Guild credited for a run, if any.
///
/// Only a full group where every participant belongs to the same guild counts
/// as a guild run. Mixed or undersized groups, and guildless players, yield `None`.
pub fn qualifying_guild(participants: &[Participant], full_group_size: usize) -> Option<GuildId> {
    if participants.is_empty() || participants.len() != full_group_size {
        return None;
    }

    let guild_id = participants[0].guild_id.filter(|g| *g != NO_GUILD)?;
    participants
        .iter()
        .all(|p| p.guild_id == Some(guild_id))
        .then_some(guild_id)
}

/// Time limits (seconds, inclusive) for each medal tier of one activity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedalThresholds {
    pub gold: u32,
    pub silver: u32,
    pub bronze: u32,
}

impl MedalThresholds {
    pub fn classify(&self, duration_secs: u32) -> Medal {
        if duration_secs <= self.gold {
            Medal::Gold
        } else if duration_secs <= self.silver {
            Medal::Silver
        } else if duration_secs <= self.bronze {
            Medal::Bronze
        } else {
            Medal::None
        }
    }
}
