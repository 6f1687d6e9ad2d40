//! Action-log writer.
//!
//! [`LogWriter`] appends records to any `Write` sink. The header is written
//! immediately on construction. The log is append-only; the one exception
//! is [`truncate_tail`](LogWriter::truncate_tail), used when a new session
//! supersedes a failed or incomplete one.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use retrace_core::{ActionIndex, Answer, Command, MoveIndex};

use crate::codec::{encode_header, encode_record, scan};
use crate::error::LogError;
use crate::types::{CommandRecord, LogRecord, SessionHeader};

/// A sink whose tail can be cut off.
pub trait TailStore: Write {
    /// Shrink the stored bytes to `len` and continue appending from there.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl TailStore for Vec<u8> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(len as usize);
        Ok(())
    }
}

impl TailStore for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Writes action-log records to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `File` or `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use retrace_core::{ActionIndex, Command, MoveIndex, SessionId};
/// use retrace_log::{LogReader, LogWriter, SessionHeader};
///
/// let header = SessionHeader::new(SessionId::new("arc", 1), 42);
/// let mut writer = LogWriter::new(Vec::new(), &header).unwrap();
/// writer
///     .record_command(ActionIndex(1), MoveIndex(0), 0xBEEF, Command::new("search"), vec![])
///     .unwrap();
/// writer.record_result(ActionIndex(1), MoveIndex(1), 0xF00D).unwrap();
/// assert_eq!(writer.records_written(), 2);
///
/// let reader = LogReader::from_bytes(&writer.into_inner()).unwrap();
/// assert_eq!(reader.command_count(), 1);
/// assert!(reader.validate(ActionIndex(1), 0xF00D).is_ok());
/// ```
pub struct LogWriter<W: Write> {
    writer: W,
    /// Byte offset of every record written (or kept on resume).
    offsets: Vec<u64>,
    /// Parallel to `offsets`: whether the record is a command.
    is_command: Vec<bool>,
    bytes_written: u64,
    commands_written: u64,
}

impl<W: Write> LogWriter<W> {
    /// Create a new log writer, immediately writing the header.
    pub fn new(mut writer: W, header: &SessionHeader) -> Result<Self, LogError> {
        let bytes_written = encode_header(&mut writer, header)?;
        Ok(Self {
            writer,
            offsets: Vec::new(),
            is_command: Vec::new(),
            bytes_written,
            commands_written: 0,
        })
    }

    /// Append one record.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let len = encode_record(&mut self.writer, record)?;
        let is_command = matches!(record, LogRecord::Command(_));
        self.offsets.push(self.bytes_written);
        self.is_command.push(is_command);
        self.bytes_written += len;
        self.commands_written += u64::from(is_command);
        Ok(())
    }

    /// Append a command record with the current indices and RNG checksum.
    pub fn record_command(
        &mut self,
        action: ActionIndex,
        moves: MoveIndex,
        rng_checksum: u64,
        command: Command,
        answers: Vec<Answer>,
    ) -> Result<(), LogError> {
        self.append(&LogRecord::Command(CommandRecord {
            action,
            moves,
            rng_checksum,
            command,
            answers,
        }))
    }

    /// Append the post-command checksum for `action`.
    pub fn record_result(
        &mut self,
        action: ActionIndex,
        moves: MoveIndex,
        state_hash: u64,
    ) -> Result<(), LogError> {
        self.append(&LogRecord::ResultChecksum {
            action,
            moves,
            state_hash,
        })
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of records in the log.
    pub fn records_written(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Number of command records in the log.
    pub fn commands_written(&self) -> u64 {
        self.commands_written
    }

    /// The action index the next command record should carry.
    pub fn next_action(&self) -> ActionIndex {
        ActionIndex(self.commands_written + 1)
    }

    /// Total bytes in the log, header included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Consume the writer and return the underlying `Write` sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: TailStore> LogWriter<W> {
    /// Reopen an existing log for appending.
    ///
    /// `existing` must be the sink's current contents. A partial trailing
    /// record left by an interrupted write is cut off before appending.
    pub fn resume(mut writer: W, existing: &[u8]) -> Result<Self, LogError> {
        let scanned = scan(existing)?;
        if scanned.truncated_tail || scanned.valid_len != existing.len() as u64 {
            writer.truncate_to(scanned.valid_len)?;
        }
        let is_command: Vec<bool> = scanned
            .records
            .iter()
            .map(|(_, r)| matches!(r, LogRecord::Command(_)))
            .collect();
        let commands_written = is_command.iter().filter(|&&c| c).count() as u64;
        Ok(Self {
            writer,
            offsets: scanned.records.iter().map(|(offset, _)| *offset).collect(),
            is_command,
            bytes_written: scanned.valid_len,
            commands_written,
        })
    }

    /// Drop every record after the first `keep_records`.
    ///
    /// Used when a new session supersedes a failed or incomplete one. If
    /// the sink cannot be cut the writer's bookkeeping is left untouched.
    pub fn truncate_tail(&mut self, keep_records: usize) -> Result<(), LogError> {
        let Some(&cut) = self.offsets.get(keep_records) else {
            return Ok(());
        };
        self.writer.truncate_to(cut)?;
        self.offsets.truncate(keep_records);
        self.is_command.truncate(keep_records);
        self.bytes_written = cut;
        self.commands_written = self.is_command.iter().filter(|&&c| c).count() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::LogReader;
    use retrace_core::SessionId;

    fn header() -> SessionHeader {
        SessionHeader::new(SessionId::new("writer", 9), 3)
    }

    fn append_action<W: Write>(writer: &mut LogWriter<W>, action: u64) {
        writer
            .record_command(
                ActionIndex(action),
                MoveIndex(action),
                action,
                Command::new("wait"),
                vec![],
            )
            .unwrap();
        writer
            .record_result(ActionIndex(action), MoveIndex(action + 1), action)
            .unwrap();
    }

    #[test]
    fn next_action_tracks_commands() {
        let mut writer = LogWriter::new(Vec::new(), &header()).unwrap();
        assert_eq!(writer.next_action(), ActionIndex(1));
        append_action(&mut writer, 1);
        writer
            .append(&LogRecord::Timestamp { unix_secs: 77 })
            .unwrap();
        assert_eq!(writer.next_action(), ActionIndex(2));
        assert_eq!(writer.records_written(), 3);
        assert_eq!(writer.bytes_written(), writer.into_inner().len() as u64);
    }

    #[test]
    fn resume_drops_partial_tail_and_continues() {
        let mut writer = LogWriter::new(Vec::new(), &header()).unwrap();
        append_action(&mut writer, 1);
        append_action(&mut writer, 2);
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 3);

        let existing = bytes.clone();
        let mut resumed = LogWriter::resume(bytes, &existing).unwrap();
        // Action 2's command survived; its checksum was cut.
        assert_eq!(resumed.records_written(), 3);
        assert_eq!(resumed.next_action(), ActionIndex(3));
        append_action(&mut resumed, 3);

        let reader = LogReader::from_bytes(&resumed.into_inner()).unwrap();
        assert!(!reader.truncated_tail());
        assert_eq!(reader.command_count(), 3);
        assert!(reader.result_for(ActionIndex(2)).is_none());
        assert!(reader.result_for(ActionIndex(3)).is_some());
    }

    #[test]
    fn truncate_tail_supersedes_later_records() {
        let mut writer = LogWriter::new(Vec::new(), &header()).unwrap();
        for a in 1..=4 {
            append_action(&mut writer, a);
        }
        writer.truncate_tail(4).unwrap();
        assert_eq!(writer.records_written(), 4);
        assert_eq!(writer.next_action(), ActionIndex(3));
        append_action(&mut writer, 3);

        let reader = LogReader::from_bytes(&writer.into_inner()).unwrap();
        assert_eq!(reader.command_count(), 3);
    }

    #[test]
    fn truncate_tail_past_the_end_keeps_everything() {
        let mut writer = LogWriter::new(Vec::new(), &header()).unwrap();
        for a in 1..=2 {
            append_action(&mut writer, a);
        }
        let before = writer.bytes_written();
        writer.truncate_tail(4).unwrap();
        writer.truncate_tail(usize::MAX).unwrap();
        assert_eq!(writer.records_written(), 4);
        assert_eq!(writer.bytes_written(), before);
        assert_eq!(writer.next_action(), ActionIndex(3));
    }

    #[test]
    fn truncate_tail_recounts_commands_after_resume() {
        let mut writer = LogWriter::new(Vec::new(), &header()).unwrap();
        for a in 1..=3 {
            append_action(&mut writer, a);
        }
        let bytes = writer.into_inner();
        let existing = bytes.clone();
        let mut resumed = LogWriter::resume(bytes, &existing).unwrap();

        resumed.truncate_tail(1).unwrap();
        assert_eq!(resumed.next_action(), ActionIndex(2));
        resumed.truncate_tail(0).unwrap();
        assert_eq!(resumed.next_action(), ActionIndex(1));
        assert_eq!(resumed.records_written(), 0);

        let reader = LogReader::from_bytes(&resumed.into_inner()).unwrap();
        assert_eq!(reader.command_count(), 0);
    }

    /// A sink whose tail cannot be cut.
    struct PinnedSink(Vec<u8>);

    impl Write for PinnedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TailStore for PinnedSink {
        fn truncate_to(&mut self, _len: u64) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "append-only"))
        }
    }

    #[test]
    fn failed_cut_leaves_the_writer_unchanged() {
        let mut writer = LogWriter::new(PinnedSink(Vec::new()), &header()).unwrap();
        for a in 1..=2 {
            append_action(&mut writer, a);
        }
        let before = writer.bytes_written();

        assert!(matches!(writer.truncate_tail(1), Err(LogError::Io(_))));
        assert_eq!(writer.records_written(), 4);
        assert_eq!(writer.bytes_written(), before);
        assert_eq!(writer.next_action(), ActionIndex(3));
    }

    #[test]
    fn file_sink_truncates_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.rtrc");

        let file = File::create(&path).unwrap();
        let mut writer = LogWriter::new(file, &header()).unwrap();
        append_action(&mut writer, 1);
        append_action(&mut writer, 2);
        writer.flush().unwrap();

        writer.truncate_tail(2).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let reader = LogReader::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(reader.command_count(), 1);
        assert_eq!(reader.len(), 2);
    }
}
