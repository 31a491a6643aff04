use bytemuck::{Pod, Zeroable};

pub const HEADER_SIZE: usize = 16;
pub const RECORD_DATA_SIZE: usize = 144;
/// Offset of the trailing name inside a record, `FIELD_OFFSET(LOG_RECORD, Name)`.
pub const NAME_OFFSET: usize = HEADER_SIZE + RECORD_DATA_SIZE;
/// Header plus one UTF-16 terminator.
pub const MIN_RECORD_LENGTH: usize = NAME_OFFSET + 2;
pub const RECORD_SIZE: usize = 1024;
pub const MAX_NAME_SPACE: usize = RECORD_SIZE - NAME_OFFSET;

pub const RECORD_TYPE_FILETAG: u32 = 0x0000_0004;
pub const RECORD_TYPE_FLAG_OUT_OF_MEMORY: u32 = 0x1000_0000;
pub const RECORD_TYPE_FLAG_EXCEED_MEMORY_ALLOWANCE: u32 = 0x2000_0000;

pub const FLT_CALLBACK_DATA_IRP_OPERATION: u32 = 0x0000_0001;
pub const FLT_CALLBACK_DATA_FAST_IO_OPERATION: u32 = 0x0000_0002;
pub const FLT_CALLBACK_DATA_FS_FILTER_OPERATION: u32 = 0x0000_0004;

/// Ticks between 1601-01-01 and 1970-01-01.
pub const EPOCH_DIFF: i64 = 116_444_736_000_000_000;

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Debug, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub length: u32,
    pub sequence_number: u32,
    pub record_type: u32,
    pub _reserved: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Debug, Default, PartialEq, Eq)]
pub struct RecordData {
    pub originating_time: i64,
    pub completion_time: i64,

    pub device_object: u64,
    pub file_object: u64,
    pub transaction: u64,
    pub process_id: u64,
    pub thread_id: u64,
    pub information: u64,

    pub status: u32,
    pub irp_flags: u32,
    pub flags: u32,

    pub major: u8,
    pub minor: u8,
    pub requestor_mode: u8,
    pub _pad: u8,

    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
    pub arg6: i64,

    pub ecp_count: u32,
    pub known_ecp_mask: u32,
    pub blocking_rule_id: u32,
    pub _reserved: u32,
}

impl RecordHeader {
    /// `bytes` must hold at least `HEADER_SIZE` bytes.
    pub fn read(bytes: &[u8]) -> Self { bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]) }
}

impl RecordData {
    /// `bytes` must hold at least `RECORD_DATA_SIZE` bytes.
    pub fn read(bytes: &[u8]) -> Self { bytemuck::pod_read_unaligned(&bytes[..RECORD_DATA_SIZE]) }

    pub fn operation_origin(&self) -> &'static str {
        if self.flags & FLT_CALLBACK_DATA_IRP_OPERATION != 0 { "IRP" }
        else if self.flags & FLT_CALLBACK_DATA_FAST_IO_OPERATION != 0 { "FIO" }
        else if self.flags & FLT_CALLBACK_DATA_FS_FILTER_OPERATION != 0 { "FSF" }
        else { "ERR" }
    }

    pub fn requestor(&self) -> &'static str { if self.requestor_mode != 0 { "Kernel" } else { "User" } }

    pub fn pre_op_unix_ticks(&self) -> i64 { self.originating_time.wrapping_sub(EPOCH_DIFF) }
    pub fn post_op_unix_ticks(&self) -> i64 { self.completion_time.wrapping_sub(EPOCH_DIFF) }
}

/// One decoded record. The name has already been through the reparse rewrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub sequence_number: u32,
    pub record_type: u32,
    pub length: u32,
    pub data: RecordData,
    pub name: String,
}

impl LogRecord {
    pub fn memory_condition(&self) -> Option<&'static str> {
        if self.record_type & RECORD_TYPE_FLAG_OUT_OF_MEMORY != 0 { Some("System Out of Memory") }
        else if self.record_type & RECORD_TYPE_FLAG_EXCEED_MEMORY_ALLOWANCE != 0 { Some("Exceeded Mamimum Allowed Memory Buffers") }
        else { None }
    }
}

/// Decodes a null-terminated UTF-16LE name; stops at the first NUL or the end of `bytes`.
pub fn utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Builds one wire record: header, data, the name as UTF-16LE and a terminator.
#[cfg(test)]
pub fn encode_record(sequence_number: u32, record_type: u32, data: &RecordData, name: &[u8]) -> Vec<u8> {
    let length = (NAME_OFFSET + name.len() + 2) as u32;
    let header = RecordHeader { length, sequence_number, record_type, _reserved: 0 };
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(bytemuck::bytes_of(data));
    out.extend_from_slice(name);
    out.extend_from_slice(&[0, 0]);
    out
}

#[cfg(test)]
pub fn wide(s: &str) -> Vec<u8> { s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect() }
