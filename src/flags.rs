use crate::opcodes::{IRP_MJ_READ, IRP_MJ_WRITE};

pub const IRP_NOCACHE: u32 = 0x0000_0001;
pub const IRP_PAGING_IO: u32 = 0x0000_0002;
pub const IRP_SYNCHRONOUS_API: u32 = 0x0000_0004;
/// Same bit as `IRP_INPUT_OPERATION`; meaning depends on the operation.
pub const IRP_SYNCHRONOUS_PAGING_IO: u32 = 0x0000_0040;
pub const IRP_INPUT_OPERATION: u32 = 0x0000_0040;
pub const IRP_CREATE_OPERATION: u32 = 0x0000_0080;
pub const IRP_READ_OPERATION: u32 = 0x0000_0100;
pub const IRP_WRITE_OPERATION: u32 = 0x0000_0200;
pub const IRP_CLOSE_OPERATION: u32 = 0x0000_0400;

/// Renders `irp_flags` as eight glyphs, `-` where a flag is clear.
pub fn format_irp_flags(irp_flags: u32, major: u8) -> String {
    let set = |bit: u32, c: char| if irp_flags & bit != 0 { c } else { '-' };
    let overloaded = if irp_flags & IRP_SYNCHRONOUS_PAGING_IO == 0 { '-' }
        else if major == IRP_MJ_READ || major == IRP_MJ_WRITE { if irp_flags & IRP_INPUT_OPERATION != 0 { 'I' } else { 'O' } }
        else if irp_flags & IRP_PAGING_IO != 0 { 'Y' }
        else { '?' };
    [
        set(IRP_NOCACHE, 'N'),
        set(IRP_PAGING_IO, 'P'),
        set(IRP_SYNCHRONOUS_API, 'S'),
        overloaded,
        set(IRP_CREATE_OPERATION, 'C'),
        set(IRP_READ_OPERATION, 'R'),
        set(IRP_WRITE_OPERATION, 'W'),
        set(IRP_CLOSE_OPERATION, 'X'),
    ].iter().collect()
}
