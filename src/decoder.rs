use std::iter::FusedIterator;
use crate::record::{LogRecord, RecordData, RecordHeader, utf16_name, HEADER_SIZE, MAX_NAME_SPACE, MIN_RECORD_LENGTH, NAME_OFFSET, RECORD_TYPE_FILETAG};

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

/// `FLT_TAG_DATA_BUFFER` up to the start of the mount point `PathBuffer`.
const TAG_DATA_HEADER: usize = 16;
const WCHAR: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("UNEXPECTED LOG_RECORD->Length: length={length} expected>={expected}")]
    LengthTooSmall { length: u32, expected: usize },
    #[error("UNEXPECTED LOG_RECORD size: used={used} bytesReturned={bytes_returned}")]
    Overrun { used: usize, bytes_returned: usize },
}

/// Walks one batch of length-prefixed records. Yields at most one `Err`, after which it is exhausted.
pub struct Records<'a> {
    buf: &'a mut [u8],
    bytes_returned: usize,
    used: usize,
    skipped: usize,
    done: bool,
}

pub fn decode(buf: &mut [u8], bytes_returned: usize) -> Records<'_> {
    let bytes_returned = bytes_returned.min(buf.len());
    Records { buf, bytes_returned, used: 0, skipped: 0, done: false }
}

impl Records<'_> {
    /// Bytes consumed so far; never exceeds the reported count.
    pub fn used(&self) -> usize { self.used.min(self.bytes_returned) }
    /// Reparse records dropped because their tag could not be interpreted.
    pub fn skipped(&self) -> usize { self.skipped }

    fn fail(&mut self, e: FramingError) -> Option<Result<LogRecord, FramingError>> {
        self.done = true;
        Some(Err(e))
    }
}

impl Iterator for Records<'_> {
    type Item = Result<LogRecord, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done { return None; }
            let start = self.used;
            if start + NAME_OFFSET > self.bytes_returned {
                self.done = true;
                return None;
            }
            let header = RecordHeader::read(&self.buf[start..]);
            let length = header.length as usize;
            if length < MIN_RECORD_LENGTH {
                return self.fail(FramingError::LengthTooSmall { length: header.length, expected: MIN_RECORD_LENGTH });
            }
            let Some(end) = start.checked_add(length).filter(|&end| end <= self.bytes_returned) else {
                let used = start.saturating_add(length);
                self.used = used;
                return self.fail(FramingError::Overrun { used, bytes_returned: self.bytes_returned });
            };
            self.used = end;
            let data = RecordData::read(&self.buf[start + HEADER_SIZE..]);
            let name_start = start + NAME_OFFSET;
            let name_region = &mut self.buf[name_start..end.min(name_start + MAX_NAME_SPACE)];
            if header.record_type & RECORD_TYPE_FILETAG != 0 && !translate_file_tag(name_region) {
                log::debug!("skipping reparse record {} with unrecognized tag", header.sequence_number);
                self.skipped += 1;
                continue;
            }
            return Some(Ok(LogRecord {
                sequence_number: header.sequence_number,
                record_type: header.record_type,
                length: header.length,
                data,
                name: utf16_name(name_region),
            }));
        }
    }
}

impl FusedIterator for Records<'_> {}

fn u16_at(b: &[u8], off: usize) -> u16 { u16::from_le_bytes([b[off], b[off + 1]]) }

/// Rewrites a mount point tag buffer in place so the region starts with the substitute name.
/// Returns false, leaving the region untouched, for any other tag.
pub fn translate_file_tag(region: &mut [u8]) -> bool {
    if region.len() < TAG_DATA_HEADER { return false; }
    let tag = u32::from_le_bytes([region[0], region[1], region[2], region[3]]);
    if tag != IO_REPARSE_TAG_MOUNT_POINT { return false; }
    let substitute_offset = u16_at(region, 8) as usize;
    let substitute_length = u16_at(region, 10) as usize;
    let src = TAG_DATA_HEADER + substitute_offset;
    let len = substitute_length
        .min(MAX_NAME_SPACE - WCHAR)
        .min(region.len() - WCHAR)
        .min(region.len().saturating_sub(src))
        & !1;
    if len > 0 { region.copy_within(src..src + len, 0); }
    region[len] = 0;
    region[len + 1] = 0;
    true
}
