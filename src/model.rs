use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

pub type RecordId = u32;
pub type ActivityId = u16;
pub type GuildId = u32;
pub type ParticipantId = u64;
pub type SpecId = u16;

/// Stored guild value meaning "not a guild run".
pub const NO_GUILD: GuildId = 0;

/// Performance tier of a run. Stored as a single byte.
///
/// Only kept for display; bytes this build does not know survive as `Other`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Medal {
    #[default]
    None,
    Bronze,
    Silver,
    Gold,
    Other(u8),
}

impl Medal {
    pub fn as_u8(self) -> u8 {
        match self {
            Medal::None => 0,
            Medal::Bronze => 1,
            Medal::Silver => 2,
            Medal::Gold => 3,
            Medal::Other(value) => value,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Medal::None,
            1 => Medal::Bronze,
            2 => Medal::Silver,
            3 => Medal::Gold,
            other => Medal::Other(other),
        }
    }
}

impl fmt::Display for Medal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A participant as reported by the run-completion source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub spec_id: SpecId,
    /// Guild the participant belonged to when the run finished.
    pub guild_id: Option<GuildId>,
}

impl Participant {
    pub fn new(participant_id: ParticipantId, spec_id: SpecId, guild_id: Option<GuildId>) -> Self {
        Self { participant_id, spec_id, guild_id }
    }
}

/// Credited participants of a run, at most one entry per participant.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: BTreeMap<ParticipantId, SpecId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the participant is already credited.
    pub fn insert(&mut self, participant_id: ParticipantId, spec_id: SpecId) -> bool {
        if self.members.contains_key(&participant_id) {
            return false;
        }
        self.members.insert(participant_id, spec_id);
        true
    }

    pub fn spec_of(&self, participant_id: ParticipantId) -> Option<SpecId> {
        self.members.get(&participant_id).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, SpecId)> + '_ {
        self.members.iter().map(|(p, s)| (*p, *s))
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.members.keys().copied()
    }
}

/// One completed run of an activity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub activity_id: ActivityId,
    /// Set only for full-group runs of a single guild.
    pub guild_id: Option<GuildId>,
    /// Completion time, lower is better.
    pub duration_secs: u32,
    /// Unix timestamp (seconds)
    pub completed_at: u32,
    pub medal: Medal,
    pub roster: Roster,
}

impl Record {
    pub fn new(
        id: RecordId,
        activity_id: ActivityId,
        guild_id: Option<GuildId>,
        duration_secs: u32,
        completed_at: u32,
        medal: Medal,
    ) -> Self {
        Self {
            id,
            activity_id,
            // Zero is the stored "no guild" value, never a real guild.
            guild_id: guild_id.filter(|g| *g != NO_GUILD),
            duration_secs,
            completed_at,
            medal,
            roster: Roster::new(),
        }
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    /// True if this run is strictly faster than `other`.
    pub fn beats(&self, other: &Record) -> bool {
        self.duration_secs < other.duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_rejects_second_entry_for_same_participant() {
        let mut roster = Roster::new();
        assert!(roster.insert(42, 250));
        assert!(!roster.insert(42, 251));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.spec_of(42), Some(250));
    }

    #[test]
    fn zero_guild_is_normalized_to_none() {
        let record = Record::new(1, 10, Some(NO_GUILD), 300, 0, Medal::Gold);
        assert_eq!(record.guild_id, None);
    }

    #[test]
    fn medal_byte_mapping() {
        for medal in [Medal::None, Medal::Bronze, Medal::Silver, Medal::Gold] {
            assert_eq!(Medal::from_u8(medal.as_u8()), medal);
        }
        assert_eq!(Medal::from_u8(9), Medal::Other(9));
        assert_eq!(Medal::Other(9).as_u8(), 9);
    }

    #[test]
    fn ties_do_not_beat() {
        let a = Record::new(1, 10, None, 300, 0, Medal::None);
        let b = Record::new(2, 10, None, 300, 0, Medal::None);
        assert!(!b.beats(&a));
        assert!(!a.beats(&a));
    }
}
