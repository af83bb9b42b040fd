use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::ChallengeConfig;
use crate::error::{ChallengeError, Result, StoreError};
use crate::id::IdGenerator;
use crate::index::{MissingRecord, RecordIndex};
use crate::model::{ActivityId, GuildId, Participant, ParticipantId, Record, RecordId, Roster};
use crate::policy;
use crate::storage::{ChallengeRow, MemberRow, RecordStore};
use crate::tracker::BestTracker;

/// Index, tracker and id generator. Always mutated together under one lock
/// so a reader never sees a record in the index that the tracker has not seen.
#[derive(Debug)]
struct State {
    index: RecordIndex,
    tracker: BestTracker,
    ids: IdGenerator,
    loaded: bool,
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub records: usize,
    pub members: usize,
    pub orphan_members: usize,
}

/// A freshly recorded run.
///
/// The record is live in memory even when `persist_error` is set; it will be
/// missing after a restart unless the caller persists it some other way.
#[derive(Debug)]
pub struct Completion {
    pub record: Record,
    pub persist_error: Option<StoreError>,
}

impl Completion {
    pub fn is_durable(&self) -> bool {
        self.persist_error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub records: usize,
    pub activities: usize,
    pub next_id: u64,
}

/// Owns every challenge record and answers best-time queries.
///
/// Created once at startup and handed to whoever reports completions and
/// whoever queries records. `record_completion` is expected from a single
/// writer; queries may run concurrently with it.
pub struct ChallengeManager<S: RecordStore> {
    state: RwLock<State>,
    store: Mutex<S>,
    config: ChallengeConfig,
}

impl<S: RecordStore> std::fmt::Debug for ChallengeManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeManager")
            .field("config", &self.config)
            .finish()
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

impl<S: RecordStore> ChallengeManager<S> {
    pub fn new(store: S, config: ChallengeConfig) -> Self {
        let state = State {
            index: RecordIndex::new(),
            tracker: BestTracker::new(),
            ids: IdGenerator::new(config.id_floor),
            loaded: false,
        };
        Self {
            state: RwLock::new(state),
            store: Mutex::new(store),
            config,
        }
    }

    /// Direct access to the backing store.
    pub fn store(&self) -> Result<MutexGuard<'_, S>> {
        self.store.lock().map_err(|_| ChallengeError::Poisoned)
    }

    fn read(&self) -> Option<RwLockReadGuard<'_, State>> {
        self.state.read().ok()
    }

    // --- STARTUP ---

    /// Rebuilds the in-memory state from the store. Runs once, at startup.
    ///
    /// Member rows whose challenge is unknown are logged and skipped.
    /// A duplicate challenge id in the store aborts the load.
    pub fn load_from_store(&self) -> Result<LoadReport> {
        let (challenges, members) = {
            let store = self.store()?;
            (store.scan_challenges()?, store.scan_members()?)
        };

        let mut guard = self.state.write().map_err(|_| ChallengeError::Poisoned)?;
        if guard.loaded {
            return Err(ChallengeError::AlreadyLoaded);
        }
        let state = &mut *guard;

        // Validate the whole batch before touching the index.
        let mut records = Vec::with_capacity(challenges.len());
        let mut seen = HashSet::with_capacity(challenges.len());
        for row in challenges {
            let record = row.into_record();
            if state.index.contains(record.id) || !seen.insert(record.id) {
                return Err(ChallengeError::DuplicateRecord(record.id));
            }
            records.push(record);
        }

        let mut report = LoadReport { records: records.len(), ..LoadReport::default() };

        for record in records {
            let id = record.id;
            state.ids.observe(id);
            state.index.insert(record);
            if let Some(stored) = state.index.get(id) {
                state.tracker.fold_activity_scopes(&state.index, stored);
            }
        }

        for row in members {
            match state.index.attach_member(row.challenge_id, row.participant_id, row.spec_id) {
                Ok(()) => {
                    if let Some(record) = state.index.get(row.challenge_id) {
                        state.tracker.fold_participant(&state.index, row.participant_id, record);
                    }
                    report.members += 1;
                }
                Err(MissingRecord { id, participant_id }) => {
                    warn!(challenge_id = id, participant_id, "member row references a challenge that does not exist, skipping");
                    report.orphan_members += 1;
                }
            }
        }

        state.loaded = true;
        info!(
            records = report.records,
            members = report.members,
            orphans = report.orphan_members,
            next_id = state.ids.peek(),
            "loaded challenges"
        );
        Ok(report)
    }

    // --- RUNTIME ---

    /// Records a finished run stamped with the current time.
    pub fn record_completion(
        &self,
        activity_id: ActivityId,
        duration_secs: u32,
        participants: &[Participant],
    ) -> Result<Completion> {
        self.record_completion_at(activity_id, duration_secs, participants, unix_now())
    }

    /// Records a finished run.
    ///
    /// Invalid input is rejected before any id is consumed. A failed store
    /// write does not undo the in-memory insert; it is returned in
    /// [`Completion::persist_error`].
    pub fn record_completion_at(
        &self,
        activity_id: ActivityId,
        duration_secs: u32,
        participants: &[Participant],
        completed_at: u32,
    ) -> Result<Completion> {
        if participants.is_empty() {
            return Err(ChallengeError::EmptyRoster);
        }
        if duration_secs == 0 {
            return Err(ChallengeError::ZeroDuration);
        }
        let mut roster = Roster::new();
        for p in participants {
            if !roster.insert(p.participant_id, p.spec_id) {
                return Err(ChallengeError::DuplicateParticipant(p.participant_id));
            }
        }

        let medal = self.config.classify(activity_id, duration_secs);
        let guild_id = policy::qualifying_guild(participants, self.config.full_group_size);

        let record = {
            let mut guard = self.state.write().map_err(|_| ChallengeError::Poisoned)?;
            let state = &mut *guard;

            let id = state.ids.next();
            let record = Record::new(id, activity_id, guild_id, duration_secs, completed_at, medal).with_roster(roster);
            state.index.insert(record.clone());
            if let Some(stored) = state.index.get(id) {
                state.tracker.fold(&state.index, stored);
            }
            record
        };

        debug!(
            challenge_id = record.id,
            activity_id,
            duration_secs,
            guild_id = record.guild_id.unwrap_or_default(),
            medal = %record.medal,
            members = record.roster.len(),
            "recorded challenge"
        );

        let persist_error = self.persist(&record).err();
        if let Some(e) = &persist_error {
            warn!(challenge_id = record.id, error = %e, "challenge kept in memory but not persisted");
        }
        Ok(Completion { record, persist_error })
    }

    fn persist(&self, record: &Record) -> std::result::Result<(), StoreError> {
        let row = ChallengeRow::from_record(record);
        let members = MemberRow::for_record(record);
        let mut store = self.store.lock().map_err(|_| StoreError::Unavailable)?;
        store.append(&row, &members)
    }

    // --- QUERIES ---

    fn resolve(&self, pick: impl FnOnce(&BestTracker) -> Option<RecordId>) -> Option<Record> {
        let state = self.read()?;
        let id = pick(&state.tracker)?;
        state.index.get(id).cloned()
    }

    /// Fastest run of the activity on the server.
    pub fn best_server_record(&self, activity_id: ActivityId) -> Option<Record> {
        self.resolve(|t| t.best_for_activity(activity_id))
    }

    /// Fastest guild run of the activity. Guild 0 never has one.
    pub fn best_guild_record(&self, guild_id: GuildId, activity_id: ActivityId) -> Option<Record> {
        self.resolve(|t| t.best_for_guild(guild_id, activity_id))
    }

    pub fn best_participant_record(&self, participant_id: ParticipantId, activity_id: ActivityId) -> Option<Record> {
        self.resolve(|t| t.best_for_participant(participant_id, activity_id))
    }

    pub fn record(&self, id: RecordId) -> Option<Record> {
        self.read()?.index.get(id).cloned()
    }

    /// The guild's best run for every activity it has completed.
    pub fn guild_records(&self, guild_id: GuildId) -> Vec<Record> {
        self.collect(|t| t.guild_bests(guild_id))
    }

    /// The participant's best run for every activity they have completed.
    pub fn participant_records(&self, participant_id: ParticipantId) -> Vec<Record> {
        self.collect(|t| t.participant_bests(participant_id))
    }

    fn collect(&self, pick: impl FnOnce(&BestTracker) -> Vec<(ActivityId, RecordId)>) -> Vec<Record> {
        let Some(state) = self.read() else {
            return Vec::new();
        };
        pick(&state.tracker)
            .into_iter()
            .filter_map(|(_, id)| state.index.get(id).cloned())
            .collect()
    }

    pub fn stats(&self) -> Option<Stats> {
        let state = self.read()?;
        Some(Stats {
            records: state.index.len(),
            activities: state.tracker.activity_count(),
            next_id: state.ids.peek(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn debug_output_does_not_take_the_state_lock() {
        let manager = ChallengeManager::new(MemoryStore::new(), ChallengeConfig::default());
        let _writer = manager.state.write().unwrap();
        let text = format!("{:?}", manager);
        assert!(text.contains("full_group_size"));
    }
}
