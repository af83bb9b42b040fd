use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use memmap2::Mmap;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{Medal, Record, NO_GUILD};

const CHALLENGE_FILE: &str = "challenge.dat";
const MEMBER_FILE: &str = "challenge_member.dat";

// Frame layout: [Length (4b)][SeaHash (8b)][Data (N bytes)]
const HEADER_LEN: usize = 4 + 8;

/// One persisted challenge. `guild_id` 0 means no guild.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[archive(check_bytes)]
pub struct ChallengeRow {
    pub id: u32,
    pub guild_id: u32,
    pub activity_id: u16,
    pub duration_secs: u32,
    pub completed_at: u32,
    pub medal: u8,
}

/// One credited participant of a persisted challenge.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[archive(check_bytes)]
pub struct MemberRow {
    pub challenge_id: u32,
    pub participant_id: u64,
    pub spec_id: u16,
}

impl ChallengeRow {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id,
            guild_id: record.guild_id.unwrap_or(NO_GUILD),
            activity_id: record.activity_id,
            duration_secs: record.duration_secs,
            completed_at: record.completed_at,
            medal: record.medal.as_u8(),
        }
    }

    /// Builds the record without its roster; member rows are joined later.
    pub fn into_record(self) -> Record {
        Record::new(
            self.id,
            self.activity_id,
            Some(self.guild_id),
            self.duration_secs,
            self.completed_at,
            Medal::from_u8(self.medal),
        )
    }
}

impl MemberRow {
    pub fn for_record(record: &Record) -> Vec<MemberRow> {
        record
            .roster
            .iter()
            .map(|(participant_id, spec_id)| MemberRow { challenge_id: record.id, participant_id, spec_id })
            .collect()
    }
}

/// Durable home of challenge and member rows.
///
/// Loading uses two independent full scans joined on the challenge id.
/// `append` persists one challenge with its roster as a single unit.
pub trait RecordStore {
    fn scan_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError>;
    fn scan_members(&self) -> Result<Vec<MemberRow>, StoreError>;
    fn append(&mut self, challenge: &ChallengeRow, members: &[MemberRow]) -> Result<(), StoreError>;
}

// --- FILE STORE ---

/// Append-only log pair in a data directory: `challenge.dat` and
/// `challenge_member.dat`.
///
/// Member frames are written before their challenge frame, so a crash in the
/// middle of an append leaves at most orphan member rows, which the loader skips.
/// A failed write is cut back off the log before the next append.
#[derive(Debug)]
pub struct SegmentStore {
    challenges: SegmentFile,
    members: SegmentFile,
    strict: bool,
}

#[derive(Debug)]
struct SegmentFile {
    path: PathBuf,
    file: File,
    /// Bytes covered by complete frames.
    len: u64,
    /// Archived size of one row; every frame in a log has the same size.
    frame_len: usize,
}

struct RawFrame<'a> {
    offset: u64,
    checksum: u64,
    payload: &'a [u8],
}

/// Splits a log of `frame_len`-sized rows into complete frames. Returns the
/// frames and the number of bytes they cover; a remainder shorter than one
/// frame is a torn tail. A complete frame declaring any other length fails
/// with its offset.
fn split_frames(bytes: &[u8], frame_len: usize) -> Result<(Vec<RawFrame<'_>>, u64), u64> {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    while bytes.len() - pos >= HEADER_LEN + frame_len {
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(&bytes[pos..pos + 4]);
        if u32::from_le_bytes(len_buf) as usize != frame_len {
            return Err(pos as u64);
        }

        let mut sum_buf = [0u8; 8];
        sum_buf.copy_from_slice(&bytes[pos + 4..pos + HEADER_LEN]);
        let checksum = u64::from_le_bytes(sum_buf);

        let start = pos + HEADER_LEN;
        frames.push(RawFrame { offset: pos as u64, checksum, payload: &bytes[start..start + frame_len] });
        pos = start + frame_len;
    }

    Ok((frames, pos as u64))
}

fn encode_frame<T>(row: &T, out: &mut Vec<u8>) -> Result<(), StoreError>
where
    T: Serialize<rkyv::ser::serializers::AllocSerializer<256>>,
{
    let bytes = rkyv::to_bytes::<_, 256>(row).map_err(|e| StoreError::Encode(e.to_string()))?;
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&seahash::hash(&bytes).to_le_bytes());
    out.extend_from_slice(&bytes);
    Ok(())
}

/// Frame size of `T`'s archived form.
fn frame_len_of<T>(row: &T) -> Result<usize, StoreError>
where
    T: Serialize<rkyv::ser::serializers::AllocSerializer<256>>,
{
    let mut frame = Vec::new();
    encode_frame(row, &mut frame)?;
    Ok(frame.len() - HEADER_LEN)
}

impl SegmentFile {
    fn open(path: PathBuf, frame_len: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut segment = Self { path, file, len: 0, frame_len };
        segment.len = segment.truncate_torn_tail()?;
        Ok(segment)
    }

    fn map(&self) -> Result<Option<Mmap>, StoreError> {
        if self.file.metadata()?.len() == 0 {
            return Ok(None);
        }
        // SAFETY: the log is only appended to through this handle, and
        // complete frames are never rewritten while a map is alive.
        let mmap = unsafe { Mmap::map(&self.file)? };
        Ok(Some(mmap))
    }

    /// Returns the length of the log after truncation.
    fn truncate_torn_tail(&self) -> Result<u64, StoreError> {
        let Some(mmap) = self.map()? else {
            return Ok(0);
        };
        let total = mmap.len() as u64;
        let valid = self.split(&mmap)?.1;
        drop(mmap);

        if valid < total {
            warn!(
                path = %self.path.display(),
                valid_bytes = valid,
                dropped_bytes = total - valid,
                "truncating torn tail of challenge log"
            );
            self.file.set_len(valid)?;
        }
        Ok(valid)
    }

    fn split<'a>(&self, bytes: &'a [u8]) -> Result<(Vec<RawFrame<'a>>, u64), StoreError> {
        split_frames(bytes, self.frame_len)
            .map_err(|offset| self.corrupt(offset, "invalid frame length".to_string()))
    }

    fn scan<T>(&self, decode: fn(&rkyv::AlignedVec) -> Result<T, String>) -> Result<Vec<T>, StoreError> {
        let Some(mmap) = self.map()? else {
            return Ok(Vec::new());
        };
        // Bytes past `len` belong to a failed append.
        let end = mmap.len().min(self.len as usize);
        let (frames, _) = self.split(&mmap[..end])?;

        let mut rows = Vec::with_capacity(frames.len());
        for frame in frames {
            if seahash::hash(frame.payload) != frame.checksum {
                return Err(self.corrupt(frame.offset, "checksum mismatch".to_string()));
            }

            // Frames are only byte-aligned inside the map; copy before validating.
            let mut aligned = rkyv::AlignedVec::with_capacity(frame.payload.len());
            aligned.extend_from_slice(frame.payload);

            rows.push(decode(&aligned).map_err(|reason| self.corrupt(frame.offset, reason))?);
        }
        Ok(rows)
    }

    fn write(&mut self, bytes: &[u8], sync: bool) -> Result<(), StoreError> {
        // Leftovers of an earlier failed write that could not be cut back.
        if self.file.metadata()?.len() > self.len {
            self.file.set_len(self.len)?;
        }

        let start = self.len;
        let mut written = self.file.write_all(bytes);
        if sync && written.is_ok() {
            written = self.file.sync_data();
        }
        if let Err(e) = written {
            self.rollback_to(start);
            return Err(e.into());
        }
        self.len = start + bytes.len() as u64;
        Ok(())
    }

    /// Drops everything past `len`. If the cut fails it is retried by the next write.
    fn rollback_to(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            warn!(path = %self.path.display(), error = %e, "could not cut back failed append");
        }
        self.len = len;
    }

    fn corrupt(&self, offset: u64, reason: String) -> StoreError {
        StoreError::Corrupt { path: self.path.clone(), offset, reason }
    }
}

fn decode_challenge(bytes: &rkyv::AlignedVec) -> Result<ChallengeRow, String> {
    let archived = rkyv::check_archived_root::<ChallengeRow>(bytes).map_err(|e| e.to_string())?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| "undecodable challenge row".to_string())
}

fn decode_member(bytes: &rkyv::AlignedVec) -> Result<MemberRow, String> {
    let archived = rkyv::check_archived_root::<MemberRow>(bytes).map_err(|e| e.to_string())?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| "undecodable member row".to_string())
}

impl SegmentStore {
    /// Opens (or creates) the store under `dir`. `strict` = fsync on every append.
    pub fn open(dir: &Path, strict: bool) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let challenges = SegmentFile::open(dir.join(CHALLENGE_FILE), frame_len_of(&ChallengeRow::default())?)?;
        let members = SegmentFile::open(dir.join(MEMBER_FILE), frame_len_of(&MemberRow::default())?)?;
        debug!(dir = %dir.display(), strict, "opened challenge store");

        Ok(Self { challenges, members, strict })
    }
}

impl RecordStore for SegmentStore {
    fn scan_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError> {
        self.challenges.scan(decode_challenge)
    }

    fn scan_members(&self) -> Result<Vec<MemberRow>, StoreError> {
        self.members.scan(decode_member)
    }

    fn append(&mut self, challenge: &ChallengeRow, members: &[MemberRow]) -> Result<(), StoreError> {
        let mut member_bytes = Vec::new();
        for member in members {
            encode_frame(member, &mut member_bytes)?;
        }
        let mut challenge_bytes = Vec::new();
        encode_frame(challenge, &mut challenge_bytes)?;

        let members_len = self.members.len;
        if !member_bytes.is_empty() {
            self.members.write(&member_bytes, self.strict)?;
        }
        if let Err(e) = self.challenges.write(&challenge_bytes, self.strict) {
            self.members.rollback_to(members_len);
            return Err(e);
        }
        Ok(())
    }
}

// --- MEMORY STORE ---

/// Store kept entirely in process memory, with injectable write failures.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    challenges: Vec<ChallengeRow>,
    members: Vec<MemberRow>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(challenges: Vec<ChallengeRow>, members: Vec<MemberRow>) -> Self {
        Self { challenges, members, fail_writes: false }
    }

    /// While set, every append fails with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn challenges(&self) -> &[ChallengeRow] {
        &self.challenges
    }

    pub fn members(&self) -> &[MemberRow] {
        &self.members
    }
}

impl RecordStore for MemoryStore {
    fn scan_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError> {
        Ok(self.challenges.clone())
    }

    fn scan_members(&self) -> Result<Vec<MemberRow>, StoreError> {
        Ok(self.members.clone())
    }

    fn append(&mut self, challenge: &ChallengeRow, members: &[MemberRow]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable);
        }
        self.members.extend_from_slice(members);
        self.challenges.push(*challenge);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(id: u32, duration_secs: u32) -> ChallengeRow {
        ChallengeRow { id, guild_id: 0, activity_id: 10, duration_secs, completed_at: 1_700_000_000, medal: 2 }
    }

    fn member(challenge_id: u32, participant_id: u64) -> MemberRow {
        MemberRow { challenge_id, participant_id, spec_id: 250 }
    }

    #[test]
    fn empty_directory_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path(), false).unwrap();
        assert!(store.scan_challenges().unwrap().is_empty());
        assert!(store.scan_members().unwrap().is_empty());
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SegmentStore::open(dir.path(), true).unwrap();
            store.append(&challenge(1, 300), &[member(1, 42), member(1, 43)]).unwrap();
            store.append(&challenge(2, 250), &[member(2, 44)]).unwrap();
        }

        let store = SegmentStore::open(dir.path(), true).unwrap();
        assert_eq!(store.scan_challenges().unwrap(), vec![challenge(1, 300), challenge(2, 250)]);
        assert_eq!(store.scan_members().unwrap(), vec![member(1, 42), member(1, 43), member(2, 44)]);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SegmentStore::open(dir.path(), false).unwrap();
            store.append(&challenge(1, 300), &[member(1, 42)]).unwrap();
        }
        let path = dir.path().join(CHALLENGE_FILE);
        let intact = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[64, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let mut store = SegmentStore::open(dir.path(), false).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);

        // New appends land after the last complete frame.
        store.append(&challenge(2, 200), &[]).unwrap();
        assert_eq!(store.scan_challenges().unwrap(), vec![challenge(1, 300), challenge(2, 200)]);
    }

    #[test]
    fn flipped_byte_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SegmentStore::open(dir.path(), false).unwrap();
            store.append(&challenge(1, 300), &[]).unwrap();
        }
        let path = dir.path().join(CHALLENGE_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let store = SegmentStore::open(dir.path(), false).unwrap();
        match store.scan_challenges() {
            Err(StoreError::Corrupt { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn flipped_length_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SegmentStore::open(dir.path(), false).unwrap();
            for id in 1..=3 {
                store.append(&challenge(id, 300), &[]).unwrap();
            }
        }
        let path = dir.path().join(CHALLENGE_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let size = bytes.len() as u64;
        bytes[0] = 0x7f;
        fs::write(&path, &bytes).unwrap();

        match SegmentStore::open(dir.path(), false) {
            Err(StoreError::Corrupt { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("expected corruption, got {:?}", other),
        }
        // Nothing was cut off.
        assert_eq!(fs::metadata(&path).unwrap().len(), size);
    }

    #[test]
    fn leftovers_of_a_failed_append_are_cut_before_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SegmentStore::open(dir.path(), false).unwrap();
        store.append(&challenge(1, 300), &[member(1, 42)]).unwrap();

        // Partial frames as a failed write_all would leave them.
        for name in [CHALLENGE_FILE, MEMBER_FILE] {
            let mut file = OpenOptions::new().append(true).open(dir.path().join(name)).unwrap();
            file.write_all(&[9, 9, 9, 9, 9, 9]).unwrap();
        }

        store.append(&challenge(2, 200), &[member(2, 43)]).unwrap();
        store.append(&challenge(3, 100), &[]).unwrap();
        let expected = vec![challenge(1, 300), challenge(2, 200), challenge(3, 100)];
        assert_eq!(store.scan_challenges().unwrap(), expected);
        drop(store);

        let store = SegmentStore::open(dir.path(), false).unwrap();
        assert_eq!(store.scan_challenges().unwrap(), expected);
        assert_eq!(store.scan_members().unwrap(), vec![member(1, 42), member(2, 43)]);
    }

    #[test]
    fn record_row_conversion() {
        let row = ChallengeRow { guild_id: 7, ..challenge(3, 180) };
        let record = row.into_record();
        assert_eq!(record.guild_id, Some(7));
        assert_eq!(record.medal, Medal::Silver);
        assert_eq!(ChallengeRow::from_record(&record), row);

        let unknown = ChallengeRow { medal: 9, ..challenge(4, 100) };
        let record = unknown.into_record();
        assert_eq!(record.medal, Medal::Other(9));
        assert_eq!(ChallengeRow::from_record(&record), unknown);
    }

    #[test]
    fn memory_store_failure_injection() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.append(&challenge(1, 1), &[member(1, 1)]), Err(StoreError::Unavailable)));
        assert!(store.challenges().is_empty());
        assert!(store.members().is_empty());

        store.set_fail_writes(false);
        store.append(&challenge(1, 1), &[member(1, 1)]).unwrap();
        assert_eq!(store.challenges().len(), 1);
    }
}
