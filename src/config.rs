use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::model::{ActivityId, Medal, RecordId};
use crate::policy::MedalThresholds;

/// Runtime settings for the challenge manager.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Headcount a run needs before it can be credited to a guild.
    pub full_group_size: usize,
    /// First id handed out when the store is empty.
    pub id_floor: RecordId,
    /// true = fsync after every append, false = OS buffer
    pub strict_durability: bool,
    pub medals: HashMap<ActivityId, MedalThresholds>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            full_group_size: 5,
            id_floor: 1,
            strict_durability: true,
            medals: HashMap::new(),
        }
    }
}

impl ChallengeConfig {
    pub fn from_json_file(path: &Path) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Medal for a run; activities without limits are unranked.
    pub fn classify(&self, activity_id: ActivityId, duration_secs: u32) -> Medal {
        self.medals
            .get(&activity_id)
            .map(|limits| limits.classify(duration_secs))
            .unwrap_or(Medal::None)
    }
}
