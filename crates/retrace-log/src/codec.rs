//! Binary encode/decode for the action-log format.
//!
//! All integers are little-endian. Strings and byte arrays are length-prefixed
//! with a `u32` length. Records are framed as `[tag u8][body_len u32][body]`
//! so a reader can tell a cleanly ended log, a log whose last record was cut
//! short, and a log with garbage in a complete record apart.

use std::io::Write;

use retrace_core::{ActionIndex, Answer, Argument, Command, Compass, MoveIndex, SessionId};

use crate::error::LogError;
use crate::types::*;
use crate::{FORMAT_VERSION, MAGIC};

/// Size of the `[tag u8][body_len u32]` record frame.
pub const RECORD_FRAME_LEN: usize = 5;

// ── Primitive writers ───────────────────────────────────────────

/// Append a single byte.
pub fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

/// Append a little-endian u32.
pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a little-endian u64.
pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a little-endian i32.
pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a `char` as its u32 scalar value.
pub fn put_char(buf: &mut Vec<u8>, c: char) {
    put_u32(buf, c as u32);
}

/// Append a u32 length prefix for `len` items of `what`.
///
/// Fails with [`LogError::TooLarge`] instead of wrapping when `len` does
/// not fit in a u32.
pub fn put_len(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), LogError> {
    let len = u32::try_from(len).map_err(|_| LogError::TooLarge { what, len })?;
    put_u32(buf, len);
    Ok(())
}

/// Append a length-prefixed byte array (u32 length + bytes).
pub fn put_bytes(buf: &mut Vec<u8>, b: &[u8]) -> Result<(), LogError> {
    put_len(buf, b.len(), "byte array")?;
    buf.extend_from_slice(b);
    Ok(())
}

/// Append a length-prefixed UTF-8 string (u32 length + bytes).
pub fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<(), LogError> {
    put_bytes(buf, s.as_bytes())
}

// ── Primitive readers ───────────────────────────────────────────

/// Bounds-checked reader over an in-memory slice.
///
/// `base` is the absolute byte offset of `data[0]` within the log, so
/// corruption reports point at the right place in the file.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    /// Start reading `data`, which begins at absolute offset `base`.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn corrupt(&self, detail: String) -> LogError {
        LogError::Corrupt {
            offset: self.base + self.pos as u64,
            detail,
        }
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], LogError> {
        if self.remaining() < n {
            return Err(self.corrupt(format!(
                "need {n} bytes, only {} left",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], LogError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, LogError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, LogError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, LogError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, LogError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a `char` stored as its u32 scalar value.
    pub fn read_char(&mut self) -> Result<char, LogError> {
        let raw = self.read_u32()?;
        char::from_u32(raw).ok_or_else(|| self.corrupt(format!("invalid char scalar {raw:#x}")))
    }

    /// Read a length-prefixed byte array.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, LogError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String, LogError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| self.corrupt(format!("invalid UTF-8 string: {e}")))
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<(), LogError> {
        if self.remaining() != 0 {
            return Err(self.corrupt(format!(
                "{} unread bytes at end of record body",
                self.remaining()
            )));
        }
        Ok(())
    }
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the log header (magic, version, session identity, seed, options).
pub fn encode_header(w: &mut dyn Write, header: &SessionHeader) -> Result<u64, LogError> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&MAGIC);
    put_u8(&mut buf, FORMAT_VERSION);

    put_str(&mut buf, &header.session.player)?;
    put_u64(&mut buf, header.session.started_at);
    put_u64(&mut buf, header.seed);

    put_len(&mut buf, header.options.len(), "option table")?;
    for (name, value) in &header.options {
        put_str(&mut buf, name)?;
        put_str(&mut buf, value)?;
    }

    w.write_all(&buf)?;
    Ok(buf.len() as u64)
}

/// Decode and validate the log header.
pub fn decode_header(cur: &mut ByteCursor<'_>) -> Result<SessionHeader, LogError> {
    let magic = cur.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(LogError::InvalidMagic);
    }

    let version = cur.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(LogError::UnsupportedVersion { found: version });
    }

    let player = cur.read_str()?;
    let started_at = cur.read_u64()?;
    let seed = cur.read_u64()?;

    let mut header = SessionHeader::new(SessionId::new(player, started_at), seed);
    let option_count = cur.read_u32()?;
    for _ in 0..option_count {
        let name = cur.read_str()?;
        let value = cur.read_str()?;
        header.options.insert(name, value);
    }

    Ok(header)
}

// ── Argument / answer payloads ──────────────────────────────────

const ARG_DIRECTION: u8 = 0;
const ARG_POSITION: u8 = 1;
const ARG_ITEM: u8 = 2;
const ARG_COUNT: u8 = 3;
const ARG_TEXT: u8 = 4;

const ANSWER_CHOICE: u8 = 0;
const ANSWER_DIRECTION: u8 = 1;
const ANSWER_POSITION: u8 = 2;
const ANSWER_LINE: u8 = 3;
const ANSWER_SELECTION: u8 = 4;

fn put_argument(buf: &mut Vec<u8>, arg: &Argument) -> Result<(), LogError> {
    match arg {
        Argument::Direction(dir) => {
            put_u8(buf, ARG_DIRECTION);
            put_u8(buf, dir.tag());
        }
        Argument::Position { x, y } => {
            put_u8(buf, ARG_POSITION);
            put_i32(buf, *x);
            put_i32(buf, *y);
        }
        Argument::Item(letter) => {
            put_u8(buf, ARG_ITEM);
            put_char(buf, *letter);
        }
        Argument::Count(n) => {
            put_u8(buf, ARG_COUNT);
            put_i32(buf, *n);
        }
        Argument::Text(text) => {
            put_u8(buf, ARG_TEXT);
            put_str(buf, text)?;
        }
    }
    Ok(())
}

fn read_compass(cur: &mut ByteCursor<'_>) -> Result<Compass, LogError> {
    let tag = cur.read_u8()?;
    Compass::from_tag(tag).ok_or_else(|| cur.corrupt(format!("invalid direction tag {tag}")))
}

fn read_argument(cur: &mut ByteCursor<'_>) -> Result<Argument, LogError> {
    let tag = cur.read_u8()?;
    Ok(match tag {
        ARG_DIRECTION => Argument::Direction(read_compass(cur)?),
        ARG_POSITION => Argument::Position {
            x: cur.read_i32()?,
            y: cur.read_i32()?,
        },
        ARG_ITEM => Argument::Item(cur.read_char()?),
        ARG_COUNT => Argument::Count(cur.read_i32()?),
        ARG_TEXT => Argument::Text(cur.read_str()?),
        other => return Err(cur.corrupt(format!("unknown argument tag {other}"))),
    })
}

fn put_answer(buf: &mut Vec<u8>, answer: &Answer) -> Result<(), LogError> {
    match answer {
        Answer::Choice(c) => {
            put_u8(buf, ANSWER_CHOICE);
            put_char(buf, *c);
        }
        Answer::Direction(dir) => {
            put_u8(buf, ANSWER_DIRECTION);
            put_u8(buf, dir.tag());
        }
        Answer::Position { x, y } => {
            put_u8(buf, ANSWER_POSITION);
            put_i32(buf, *x);
            put_i32(buf, *y);
        }
        Answer::Line(text) => {
            put_u8(buf, ANSWER_LINE);
            put_str(buf, text)?;
        }
        Answer::Selection(ids) => {
            put_u8(buf, ANSWER_SELECTION);
            put_len(buf, ids.len(), "menu selection")?;
            for &id in ids {
                put_u32(buf, id);
            }
        }
    }
    Ok(())
}

fn read_answer(cur: &mut ByteCursor<'_>) -> Result<Answer, LogError> {
    let tag = cur.read_u8()?;
    Ok(match tag {
        ANSWER_CHOICE => Answer::Choice(cur.read_char()?),
        ANSWER_DIRECTION => Answer::Direction(read_compass(cur)?),
        ANSWER_POSITION => Answer::Position {
            x: cur.read_i32()?,
            y: cur.read_i32()?,
        },
        ANSWER_LINE => Answer::Line(cur.read_str()?),
        ANSWER_SELECTION => {
            let count = cur.read_u32()? as usize;
            // Each id is 4 bytes; reject counts the body cannot hold.
            if count > cur.remaining() / 4 {
                return Err(cur.corrupt(format!("selection count {count} exceeds body")));
            }
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(cur.read_u32()?);
            }
            Answer::Selection(ids)
        }
        other => return Err(cur.corrupt(format!("unknown answer tag {other}"))),
    })
}

// ── Record encode/decode ────────────────────────────────────────

/// Serialize a record body (without the tag/length frame).
pub fn encode_body(record: &LogRecord) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::new();
    match record {
        LogRecord::Command(rec) => {
            put_u64(&mut buf, rec.action.0);
            put_u64(&mut buf, rec.moves.0);
            put_u64(&mut buf, rec.rng_checksum);
            put_u32(&mut buf, rec.command.repeat);
            put_str(&mut buf, &rec.command.name)?;
            put_len(&mut buf, rec.command.args.len(), "argument list")?;
            for arg in &rec.command.args {
                put_argument(&mut buf, arg)?;
            }
            put_len(&mut buf, rec.answers.len(), "answer list")?;
            for answer in &rec.answers {
                put_answer(&mut buf, answer)?;
            }
        }
        LogRecord::ResultChecksum {
            action,
            moves,
            state_hash,
        } => {
            put_u64(&mut buf, action.0);
            put_u64(&mut buf, moves.0);
            put_u64(&mut buf, *state_hash);
        }
        LogRecord::OptionChange { name, value } => {
            put_str(&mut buf, name)?;
            put_str(&mut buf, value)?;
        }
        LogRecord::Timestamp { unix_secs } => {
            put_u64(&mut buf, *unix_secs);
        }
        LogRecord::StateChange { action, image } => {
            put_u64(&mut buf, action.0);
            put_bytes(&mut buf, image)?;
        }
    }
    Ok(buf)
}

/// Encode one framed record. Returns the number of bytes written.
pub fn encode_record(w: &mut dyn Write, record: &LogRecord) -> Result<u64, LogError> {
    let body = encode_body(record)?;
    let mut frame = Vec::with_capacity(RECORD_FRAME_LEN);
    put_u8(&mut frame, record.tag());
    put_len(&mut frame, body.len(), "record body")?;
    w.write_all(&frame)?;
    w.write_all(&body)?;
    Ok((RECORD_FRAME_LEN + body.len()) as u64)
}

/// Outcome of decoding at one offset.
#[derive(Debug)]
pub enum Decoded {
    /// A complete record and the total bytes it occupied, frame included.
    Record(LogRecord, usize),
    /// No bytes left: the log ended cleanly.
    End,
    /// The trailing record was cut short by an interrupted write.
    Truncated,
}

fn is_known_tag(tag: u8) -> bool {
    matches!(
        tag,
        TAG_COMMAND | TAG_RESULT_CHECKSUM | TAG_OPTION_CHANGE | TAG_TIMESTAMP | TAG_STATE_CHANGE
    )
}

/// Decode the record starting at the front of `data`.
///
/// `offset` is the absolute position of `data[0]` in the log and is used
/// only for error reporting.
pub fn decode_record(data: &[u8], offset: u64) -> Result<Decoded, LogError> {
    if data.is_empty() {
        return Ok(Decoded::End);
    }
    // Check the tag before trusting the length: a garbage tag with a huge
    // length must be reported as corruption, not as a short tail.
    let tag = data[0];
    if !is_known_tag(tag) {
        return Err(LogError::Corrupt {
            offset,
            detail: format!("unknown record tag {tag}"),
        });
    }
    if data.len() < RECORD_FRAME_LEN {
        return Ok(Decoded::Truncated);
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[1..RECORD_FRAME_LEN]);
    let body_len = u32::from_le_bytes(len_bytes) as usize;
    if data.len() - RECORD_FRAME_LEN < body_len {
        return Ok(Decoded::Truncated);
    }

    let body = &data[RECORD_FRAME_LEN..RECORD_FRAME_LEN + body_len];
    let mut cur = ByteCursor::new(body, offset + RECORD_FRAME_LEN as u64);
    let record = decode_body(tag, &mut cur)?;
    cur.finish()?;
    Ok(Decoded::Record(record, RECORD_FRAME_LEN + body_len))
}

fn decode_body(tag: u8, cur: &mut ByteCursor<'_>) -> Result<LogRecord, LogError> {
    Ok(match tag {
        TAG_COMMAND => {
            let action = ActionIndex(cur.read_u64()?);
            let moves = MoveIndex(cur.read_u64()?);
            let rng_checksum = cur.read_u64()?;
            let repeat = cur.read_u32()?;
            let mut command = Command::new(cur.read_str()?).with_repeat(repeat);
            let arg_count = cur.read_u32()?;
            for _ in 0..arg_count {
                command.args.push(read_argument(cur)?);
            }
            let answer_count = cur.read_u32()? as usize;
            let mut answers = Vec::with_capacity(answer_count.min(cur.remaining()));
            for _ in 0..answer_count {
                answers.push(read_answer(cur)?);
            }
            LogRecord::Command(CommandRecord {
                action,
                moves,
                rng_checksum,
                command,
                answers,
            })
        }
        TAG_RESULT_CHECKSUM => LogRecord::ResultChecksum {
            action: ActionIndex(cur.read_u64()?),
            moves: MoveIndex(cur.read_u64()?),
            state_hash: cur.read_u64()?,
        },
        TAG_OPTION_CHANGE => LogRecord::OptionChange {
            name: cur.read_str()?,
            value: cur.read_str()?,
        },
        TAG_TIMESTAMP => LogRecord::Timestamp {
            unix_secs: cur.read_u64()?,
        },
        TAG_STATE_CHANGE => LogRecord::StateChange {
            action: ActionIndex(cur.read_u64()?),
            image: cur.read_bytes()?,
        },
        other => {
            return Err(cur.corrupt(format!("unknown record tag {other}")));
        }
    })
}

// ── Whole-log scan ──────────────────────────────────────────────

/// A fully decoded log.
#[derive(Debug)]
pub struct ScannedLog {
    /// The decoded header.
    pub header: SessionHeader,
    /// Every complete record with its absolute byte offset.
    pub records: Vec<(u64, LogRecord)>,
    /// Length of the valid prefix (header plus complete records).
    pub valid_len: u64,
    /// Whether a partial trailing record was dropped.
    pub truncated_tail: bool,
}

/// Decode an entire log held in memory.
pub fn scan(bytes: &[u8]) -> Result<ScannedLog, LogError> {
    let mut cur = ByteCursor::new(bytes, 0);
    let header = decode_header(&mut cur)?;

    let mut offset = cur.position();
    let mut records = Vec::new();
    let mut truncated_tail = false;
    loop {
        match decode_record(&bytes[offset..], offset as u64)? {
            Decoded::Record(record, len) => {
                records.push((offset as u64, record));
                offset += len;
            }
            Decoded::End => break,
            Decoded::Truncated => {
                truncated_tail = true;
                break;
            }
        }
    }

    Ok(ScannedLog {
        header,
        records,
        valid_len: offset as u64,
        truncated_tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> SessionHeader {
        SessionHeader::new(SessionId::new("tester", 1_000), 7).with_option("color", "on")
    }

    fn command_record(action: u64) -> LogRecord {
        LogRecord::Command(CommandRecord {
            action: ActionIndex(action),
            moves: MoveIndex(action * 2),
            rng_checksum: 0xABCD ^ action,
            command: Command::new("throw")
                .with_arg(Argument::Item('d'))
                .with_arg(Argument::Direction(Compass::SouthWest)),
            answers: vec![
                Answer::Choice('y'),
                Answer::Selection(vec![3, 1, 4]),
                Answer::Line("Elbereth".into()),
            ],
        })
    }

    fn encode_log(records: &[LogRecord]) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_header(&mut buf, &header()).unwrap();
        for record in records {
            encode_record(&mut buf, record).unwrap();
        }
        buf
    }

    #[test]
    fn command_record_with_answers_survives_encoding() {
        let records = vec![
            command_record(1),
            LogRecord::ResultChecksum {
                action: ActionIndex(1),
                moves: MoveIndex(3),
                state_hash: 99,
            },
        ];
        let scanned = scan(&encode_log(&records)).unwrap();
        assert_eq!(scanned.header, header());
        let decoded: Vec<_> = scanned.records.into_iter().map(|(_, r)| r).collect();
        assert_eq!(decoded, records);
        assert!(!scanned.truncated_tail);
    }

    #[test]
    fn long_argument_lists_survive_encoding() {
        for count in [255, 256, 300] {
            let mut command = Command::new("cast");
            for n in 0..count {
                command.args.push(Argument::Count(n));
            }
            let record = LogRecord::Command(CommandRecord {
                action: ActionIndex(1),
                moves: MoveIndex(0),
                rng_checksum: 7,
                command,
                answers: vec![],
            });
            let scanned = scan(&encode_log(std::slice::from_ref(&record))).unwrap();
            assert_eq!(scanned.records[0].1, record, "{count} arguments");
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_length_is_rejected_not_wrapped() {
        let mut buf = Vec::new();
        let len = u32::MAX as usize + 1;
        match put_len(&mut buf, len, "byte array") {
            Err(LogError::TooLarge { what, len: got }) => {
                assert_eq!(what, "byte array");
                assert_eq!(got, len);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn header_only_log_is_empty_not_corrupt() {
        let buf = encode_log(&[]);
        let scanned = scan(&buf).unwrap();
        assert!(scanned.records.is_empty());
        assert_eq!(scanned.valid_len, buf.len() as u64);
    }

    #[test]
    fn every_cut_inside_trailing_record_is_truncation() {
        let full = encode_log(&[command_record(1), command_record(2)]);
        let first_end = {
            let scanned = scan(&full).unwrap();
            scanned.records[1].0 as usize
        };
        for cut in first_end + 1..full.len() {
            let scanned = scan(&full[..cut]).unwrap();
            assert_eq!(scanned.records.len(), 1, "cut at {cut}");
            assert!(scanned.truncated_tail, "cut at {cut}");
            assert_eq!(scanned.valid_len, first_end as u64);
        }
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let mut buf = encode_log(&[command_record(1)]);
        let at = buf.len() as u64;
        buf.extend_from_slice(&[0x7F, 0, 0, 0, 0]);
        match scan(&buf) {
            Err(LogError::Corrupt { offset, .. }) => assert_eq!(offset, at),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn body_with_trailing_garbage_is_corrupt() {
        let mut buf = encode_log(&[]);
        let body = {
            let mut b = encode_body(&LogRecord::Timestamp { unix_secs: 5 }).unwrap();
            b.push(0xEE);
            b
        };
        buf.push(TAG_TIMESTAMP);
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        assert!(matches!(scan(&buf), Err(LogError::Corrupt { .. })));
    }

    #[test]
    fn bad_magic_and_version() {
        assert!(matches!(scan(b"XXXX\x03"), Err(LogError::InvalidMagic)));
        let mut buf = encode_log(&[]);
        buf[4] = 99;
        assert!(matches!(
            scan(&buf),
            Err(LogError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn missing_header_is_corrupt() {
        assert!(matches!(scan(&[]), Err(LogError::Corrupt { .. })));
        assert!(matches!(scan(b"RTRC"), Err(LogError::Corrupt { .. })));
    }

    #[test]
    fn invalid_direction_tag_is_corrupt() {
        let mut body = Vec::new();
        put_u64(&mut body, 1);
        put_u64(&mut body, 0);
        put_u64(&mut body, 0);
        put_u32(&mut body, 1);
        put_str(&mut body, "move").unwrap();
        put_u32(&mut body, 1);
        put_u8(&mut body, ARG_DIRECTION);
        put_u8(&mut body, 200);
        put_u32(&mut body, 0);

        let mut buf = encode_log(&[]);
        buf.push(TAG_COMMAND);
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        assert!(matches!(scan(&buf), Err(LogError::Corrupt { .. })));
    }
}
