//! Action-log reader.
//!
//! [`LogReader`] loads a complete log from any `Read` source, validates its
//! structure up front, and then exposes one forward cursor over the
//! records. The cursor is the only notion of "current log position";
//! checkpoint restores move it with [`seek_record`](LogReader::seek_record).

use std::io::Read;

use retrace_core::{ActionIndex, MoveIndex, SessionId};

use crate::codec::scan;
use crate::error::{ChecksumKind, ChecksumMismatch, LogError};
use crate::types::{CommandRecord, LogRecord, SessionHeader};

/// A loaded, indexed action log with a forward cursor.
#[derive(Debug)]
pub struct LogReader {
    header: SessionHeader,
    records: Vec<LogRecord>,
    offsets: Vec<u64>,
    /// `commands[i]` is the record index of the command at `ActionIndex(i + 1)`.
    commands: Vec<usize>,
    results: Vec<Option<usize>>,
    changes: Vec<Option<usize>>,
    cursor: usize,
    valid_len: u64,
    truncated_tail: bool,
}

impl LogReader {
    /// Read a log to the end and index it.
    pub fn open<R: Read>(mut reader: R) -> Result<Self, LogError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Index a log already held in memory.
    ///
    /// Fails with [`LogError::Corrupt`] if any complete record is invalid or
    /// if command records are out of sequence.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        let scanned = scan(bytes)?;

        let mut records = Vec::with_capacity(scanned.records.len());
        let mut offsets = Vec::with_capacity(scanned.records.len());
        let mut commands = Vec::new();
        let mut results = Vec::new();
        let mut changes = Vec::new();

        for (index, (offset, record)) in scanned.records.into_iter().enumerate() {
            match &record {
                LogRecord::Command(rec) => {
                    let expected = commands.len() as u64 + 1;
                    if rec.action.0 != expected {
                        return Err(LogError::Corrupt {
                            offset,
                            detail: format!(
                                "command for action {} where {expected} was expected",
                                rec.action
                            ),
                        });
                    }
                    commands.push(index);
                    results.push(None);
                    changes.push(None);
                }
                LogRecord::ResultChecksum { action, .. } | LogRecord::StateChange { action, .. } => {
                    let latest = commands.len() as u64;
                    if action.0 != latest || latest == 0 {
                        return Err(LogError::Corrupt {
                            offset,
                            detail: format!(
                                "record for action {action} does not follow its command (latest is {latest})"
                            ),
                        });
                    }
                    let slot = if matches!(record, LogRecord::ResultChecksum { .. }) {
                        &mut results[latest as usize - 1]
                    } else {
                        &mut changes[latest as usize - 1]
                    };
                    *slot = Some(index);
                }
                LogRecord::OptionChange { .. } | LogRecord::Timestamp { .. } => {}
            }
            offsets.push(offset);
            records.push(record);
        }

        Ok(Self {
            header: scanned.header,
            records,
            offsets,
            commands,
            results,
            changes,
            cursor: 0,
            valid_len: scanned.valid_len,
            truncated_tail: scanned.truncated_tail,
        })
    }

    /// Session header.
    pub fn header(&self) -> &SessionHeader {
        &self.header
    }

    /// Identity of the recorded session.
    pub fn session_id(&self) -> &SessionId {
        &self.header.session
    }

    /// Number of complete records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of recorded commands.
    pub fn command_count(&self) -> u64 {
        self.commands.len() as u64
    }

    /// The position after the last recorded command.
    pub fn max_action(&self) -> ActionIndex {
        ActionIndex(self.command_count() + 1)
    }

    /// Turn counter at [`max_action`](Self::max_action), as far as the log knows.
    pub fn final_moves(&self) -> MoveIndex {
        let Some(&last) = self.commands.last() else {
            return MoveIndex(0);
        };
        if let Some((moves, _)) = self.result_for(ActionIndex(self.command_count())) {
            return moves;
        }
        self.records[last]
            .as_command()
            .map(|c| c.moves)
            .unwrap_or_default()
    }

    /// Whether a partial trailing record was dropped at load time.
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Length in bytes of the usable part of the log.
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    // ── Cursor ──────────────────────────────────────────────────

    /// Record index the cursor points at.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the cursor has consumed every record.
    pub fn at_end(&self) -> bool {
        self.cursor >= self.records.len()
    }

    /// Consume and return the next record, or `None` at end of log.
    pub fn next_record(&mut self) -> Option<&LogRecord> {
        let record = self.records.get(self.cursor)?;
        self.cursor += 1;
        Some(record)
    }

    /// The next record without consuming it.
    pub fn peek(&self) -> Option<&LogRecord> {
        self.records.get(self.cursor)
    }

    /// Move the cursor to a record index (clamped to the end of the log).
    pub fn seek_record(&mut self, index: usize) {
        self.cursor = index.min(self.records.len());
    }

    /// Move the cursor to the record starting at byte `offset`.
    ///
    /// `valid_len()` is accepted and places the cursor at the end.
    pub fn seek_byte(&mut self, offset: u64) -> Result<(), LogError> {
        if offset == self.valid_len {
            self.cursor = self.records.len();
            return Ok(());
        }
        match self.offsets.binary_search(&offset) {
            Ok(index) => {
                self.cursor = index;
                Ok(())
            }
            Err(_) => Err(LogError::Misaligned { offset }),
        }
    }

    /// Move the cursor back to the first record.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    // ── Random access ───────────────────────────────────────────

    /// Record at `index`.
    pub fn record(&self, index: usize) -> Option<&LogRecord> {
        self.records.get(index)
    }

    /// Byte offset of the record at `index`.
    pub fn record_offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    /// Record index of the command at `action`.
    pub fn command_position(&self, action: ActionIndex) -> Option<usize> {
        let slot = action.0.checked_sub(1)? as usize;
        self.commands.get(slot).copied()
    }

    /// The command record at `action`.
    pub fn command(&self, action: ActionIndex) -> Option<&CommandRecord> {
        self.command_position(action)
            .and_then(|i| self.records[i].as_command())
    }

    /// Turn counter recorded at `action`, before its command ran.
    pub fn moves_at(&self, action: ActionIndex) -> Option<MoveIndex> {
        if action == self.max_action() {
            return Some(self.final_moves());
        }
        self.command(action).map(|c| c.moves)
    }

    /// First action whose recorded turn counter is at least `moves`.
    ///
    /// One past [`max_action`](Self::max_action) when the log never gets
    /// that far.
    pub fn action_for_move(&self, moves: MoveIndex) -> ActionIndex {
        let slot = self.commands.partition_point(|&i| {
            self.records[i]
                .as_command()
                .is_some_and(|c| c.moves < moves)
        });
        if slot < self.commands.len() {
            return ActionIndex(slot as u64 + 1);
        }
        if self.final_moves() >= moves {
            self.max_action()
        } else {
            self.max_action().next()
        }
    }

    /// Post-command `(moves, state_hash)` recorded for `action`.
    pub fn result_for(&self, action: ActionIndex) -> Option<(MoveIndex, u64)> {
        let slot = action.0.checked_sub(1)? as usize;
        let index = (*self.results.get(slot)?)?;
        match &self.records[index] {
            LogRecord::ResultChecksum {
                moves, state_hash, ..
            } => Some((*moves, *state_hash)),
            _ => None,
        }
    }

    /// Record index and image of the change record following `action`.
    pub fn change_for(&self, action: ActionIndex) -> Option<(usize, &[u8])> {
        let slot = action.0.checked_sub(1)? as usize;
        let index = (*self.changes.get(slot)?)?;
        self.change_at(index).map(|image| (index, image))
    }

    /// Image of the change record at record index `index`.
    pub fn change_at(&self, index: usize) -> Option<&[u8]> {
        match self.records.get(index)? {
            LogRecord::StateChange { image, .. } => Some(image),
            _ => None,
        }
    }

    // ── Validation ──────────────────────────────────────────────

    /// Compare the post-command state hash against the recorded one.
    ///
    /// Actions without a recorded checksum always validate.
    pub fn validate(&self, action: ActionIndex, observed: u64) -> Result<(), ChecksumMismatch> {
        match self.result_for(action) {
            Some((_, recorded)) if recorded != observed => Err(ChecksumMismatch {
                action,
                kind: ChecksumKind::State,
                recorded,
                observed,
            }),
            _ => Ok(()),
        }
    }

    /// Compare the pre-command RNG checksum against the recorded one.
    pub fn validate_rng(&self, action: ActionIndex, observed: u64) -> Result<(), ChecksumMismatch> {
        match self.command(action) {
            Some(rec) if rec.rng_checksum != observed => Err(ChecksumMismatch {
                action,
                kind: ChecksumKind::Rng,
                recorded: rec.rng_checksum,
                observed,
            }),
            _ => Ok(()),
        }
    }
}
