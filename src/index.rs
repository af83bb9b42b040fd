use std::collections::HashMap;
use crate::model::{ParticipantId, Record, RecordId, SpecId};

/// A roster row pointed at a challenge that is not in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingRecord {
    pub id: RecordId,
    pub participant_id: ParticipantId,
}

/// Owns every known record, keyed by id. Records are never removed.
#[derive(Debug, Default)]
pub struct RecordIndex {
    records: HashMap<RecordId, Record>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a duplicate id: the id generator and the index are out of sync.
    pub fn insert(&mut self, record: Record) {
        let id = record.id;
        if self.records.insert(id, record).is_some() {
            panic!("challenge {} inserted twice into the record index", id);
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Every record, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Joins a stored roster row onto its record. Only used during bulk load;
    /// records built at runtime arrive with their roster already set.
    pub fn attach_member(
        &mut self,
        id: RecordId,
        participant_id: ParticipantId,
        spec_id: SpecId,
    ) -> Result<(), MissingRecord> {
        match self.records.get_mut(&id) {
            Some(record) => {
                // A repeated row for the same participant keeps the first spec.
                record.roster.insert(participant_id, spec_id);
                Ok(())
            }
            None => Err(MissingRecord { id, participant_id }),
        }
    }
}
