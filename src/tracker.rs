//! Lowest-time record per activity, per guild and per participant.
//!
//! The tracker only stores record ids; durations are resolved through the
//! [`RecordIndex`] that owns the records. A stored best is replaced only by a
//! strictly faster run, so among equal times the first record folded wins.

use std::collections::HashMap;

use crate::index::RecordIndex;
use crate::model::{ActivityId, GuildId, ParticipantId, Record, RecordId, NO_GUILD};

type ByActivity = HashMap<ActivityId, RecordId>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BestTracker {
    by_activity: ByActivity,
    by_guild: HashMap<GuildId, ByActivity>,
    by_participant: HashMap<ParticipantId, ByActivity>,
}

/// Replaces the entry for `record.activity_id` if `record` is strictly faster.
fn offer(slot: &mut ByActivity, index: &RecordIndex, record: &Record) -> bool {
    let replace = match slot.get(&record.activity_id).and_then(|id| index.get(*id)) {
        Some(current) => record.beats(current),
        None => true,
    };
    if replace {
        slot.insert(record.activity_id, record.id);
    }
    replace
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `record` into every scope it belongs to.
    pub fn fold(&mut self, index: &RecordIndex, record: &Record) {
        self.fold_activity_scopes(index, record);
        for participant_id in record.roster.participants() {
            self.fold_participant(index, participant_id, record);
        }
    }

    /// Server-wide scope, plus the guild scope for guild runs.
    pub fn fold_activity_scopes(&mut self, index: &RecordIndex, record: &Record) {
        offer(&mut self.by_activity, index, record);

        if let Some(guild_id) = record.guild_id.filter(|g| *g != NO_GUILD) {
            offer(self.by_guild.entry(guild_id).or_default(), index, record);
        }
    }

    /// One participant's scope. Returns true if `record` became their best.
    pub fn fold_participant(&mut self, index: &RecordIndex, participant_id: ParticipantId, record: &Record) -> bool {
        offer(self.by_participant.entry(participant_id).or_default(), index, record)
    }

    pub fn best_for_activity(&self, activity_id: ActivityId) -> Option<RecordId> {
        self.by_activity.get(&activity_id).copied()
    }

    pub fn best_for_guild(&self, guild_id: GuildId, activity_id: ActivityId) -> Option<RecordId> {
        if guild_id == NO_GUILD {
            return None;
        }
        self.by_guild.get(&guild_id)?.get(&activity_id).copied()
    }

    pub fn best_for_participant(&self, participant_id: ParticipantId, activity_id: ActivityId) -> Option<RecordId> {
        self.by_participant.get(&participant_id)?.get(&activity_id).copied()
    }

    /// Every activity the guild holds a record for, sorted by activity.
    pub fn guild_bests(&self, guild_id: GuildId) -> Vec<(ActivityId, RecordId)> {
        if guild_id == NO_GUILD {
            return Vec::new();
        }
        sorted(self.by_guild.get(&guild_id))
    }

    /// Every activity the participant holds a record for, sorted by activity.
    pub fn participant_bests(&self, participant_id: ParticipantId) -> Vec<(ActivityId, RecordId)> {
        sorted(self.by_participant.get(&participant_id))
    }

    pub fn activity_count(&self) -> usize {
        self.by_activity.len()
    }
}

fn sorted(scope: Option<&ByActivity>) -> Vec<(ActivityId, RecordId)> {
    let mut out: Vec<_> = scope
        .map(|m| m.iter().map(|(a, r)| (*a, *r)).collect())
        .unwrap_or_default();
    out.sort_unstable();
    out
}
