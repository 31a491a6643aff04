use std::borrow::Cow;

pub const IRP_MJ_CREATE: u8 = 0x00;
pub const IRP_MJ_CLOSE: u8 = 0x02;
pub const IRP_MJ_READ: u8 = 0x03;
pub const IRP_MJ_WRITE: u8 = 0x04;
pub const IRP_MJ_DIRECTORY_CONTROL: u8 = 0x0c;
pub const IRP_MJ_FILE_SYSTEM_CONTROL: u8 = 0x0d;
pub const IRP_MJ_DEVICE_CONTROL: u8 = 0x0e;
pub const IRP_MJ_LOCK_CONTROL: u8 = 0x11;
pub const IRP_MJ_POWER: u8 = 0x16;
pub const IRP_MJ_SYSTEM_CONTROL: u8 = 0x17;
pub const IRP_MJ_PNP: u8 = 0x1b;

/// Filter manager numbers its synthetic operations backwards from 0xff.
const fn fltmgr(n: u8) -> u8 { 0u8.wrapping_sub(n) }

pub const IRP_MJ_ACQUIRE_FOR_SECTION_SYNCHRONIZATION: u8 = fltmgr(1);
pub const IRP_MJ_RELEASE_FOR_SECTION_SYNCHRONIZATION: u8 = fltmgr(2);
pub const IRP_MJ_ACQUIRE_FOR_MOD_WRITE: u8 = fltmgr(3);
pub const IRP_MJ_RELEASE_FOR_MOD_WRITE: u8 = fltmgr(4);
pub const IRP_MJ_ACQUIRE_FOR_CC_FLUSH: u8 = fltmgr(5);
pub const IRP_MJ_RELEASE_FOR_CC_FLUSH: u8 = fltmgr(6);
pub const IRP_MJ_NOTIFY_STREAM_FO_CREATION: u8 = fltmgr(7);
pub const IRP_MJ_FAST_IO_CHECK_IF_POSSIBLE: u8 = fltmgr(13);
pub const IRP_MJ_NETWORK_QUERY_OPEN: u8 = fltmgr(14);
pub const IRP_MJ_MDL_READ: u8 = fltmgr(15);
pub const IRP_MJ_MDL_READ_COMPLETE: u8 = fltmgr(16);
pub const IRP_MJ_PREPARE_MDL_WRITE: u8 = fltmgr(17);
pub const IRP_MJ_MDL_WRITE_COMPLETE: u8 = fltmgr(18);
pub const IRP_MJ_VOLUME_MOUNT: u8 = fltmgr(19);
pub const IRP_MJ_VOLUME_DISMOUNT: u8 = fltmgr(20);
pub const IRP_MJ_TRANSACTION_NOTIFY: u8 = fltmgr(40);

/// Minor vocabulary attached to a major code, with the fallback it uses for unknown values.
#[derive(Clone, Copy)]
enum Minors {
    None,
    Irp(&'static [(u8, &'static str)]),
    Transaction(&'static [(u8, &'static str)]),
}

const READ_WRITE_MINORS: &[(u8, &str)] = &[
    (0x00, "IRP_MN_NORMAL"),
    (0x01, "IRP_MN_DPC"),
    (0x02, "IRP_MN_MDL"),
    (0x04, "IRP_MN_COMPLETE"),
    (0x08, "IRP_MN_COMPRESSED"),
    (0x03, "IRP_MN_MDL_DPC"),
    (0x06, "IRP_MN_COMPLETE_MDL"),
    (0x07, "IRP_MN_COMPLETE_MDL_DPC"),
];

const DIRECTORY_MINORS: &[(u8, &str)] = &[
    (0x01, "IRP_MN_QUERY_DIRECTORY"),
    (0x02, "IRP_MN_NOTIFY_CHANGE_DIRECTORY"),
];

const FS_CONTROL_MINORS: &[(u8, &str)] = &[
    (0x00, "IRP_MN_USER_FS_REQUEST"),
    (0x01, "IRP_MN_MOUNT_VOLUME"),
    (0x02, "IRP_MN_VERIFY_VOLUME"),
    (0x03, "IRP_MN_LOAD_FILE_SYSTEM"),
    (0x04, "IRP_MN_TRACK_LINK"),
];

const DEVICE_CONTROL_MINORS: &[(u8, &str)] = &[(0x01, "IRP_MN_SCSI_CLASS")];

const LOCK_MINORS: &[(u8, &str)] = &[
    (0x01, "IRP_MN_LOCK"),
    (0x02, "IRP_MN_UNLOCK_SINGLE"),
    (0x03, "IRP_MN_UNLOCK_ALL"),
    (0x04, "IRP_MN_UNLOCK_ALL_BY_KEY"),
];

const POWER_MINORS: &[(u8, &str)] = &[
    (0x00, "IRP_MN_WAIT_WAKE"),
    (0x01, "IRP_MN_POWER_SEQUENCE"),
    (0x02, "IRP_MN_SET_POWER"),
    (0x03, "IRP_MN_QUERY_POWER"),
];

const WMI_MINORS: &[(u8, &str)] = &[
    (0x00, "IRP_MN_QUERY_ALL_DATA"),
    (0x01, "IRP_MN_QUERY_SINGLE_INSTANCE"),
    (0x02, "IRP_MN_CHANGE_SINGLE_INSTANCE"),
    (0x03, "IRP_MN_CHANGE_SINGLE_ITEM"),
    (0x04, "IRP_MN_ENABLE_EVENTS"),
    (0x05, "IRP_MN_DISABLE_EVENTS"),
    (0x06, "IRP_MN_ENABLE_COLLECTION"),
    (0x07, "IRP_MN_DISABLE_COLLECTION"),
    (0x08, "IRP_MN_REGINFO"),
    (0x09, "IRP_MN_EXECUTE_METHOD"),
];

const PNP_MINORS: &[(u8, &str)] = &[
    (0x00, "IRP_MN_START_DEVICE"),
    (0x01, "IRP_MN_QUERY_REMOVE_DEVICE"),
    (0x02, "IRP_MN_REMOVE_DEVICE"),
    (0x03, "IRP_MN_CANCEL_REMOVE_DEVICE"),
    (0x04, "IRP_MN_STOP_DEVICE"),
    (0x05, "IRP_MN_QUERY_STOP_DEVICE"),
    (0x06, "IRP_MN_CANCEL_STOP_DEVICE"),
    (0x07, "IRP_MN_QUERY_DEVICE_RELATIONS"),
    (0x08, "IRP_MN_QUERY_INTERFACE"),
    (0x09, "IRP_MN_QUERY_CAPABILITIES"),
    (0x0a, "IRP_MN_QUERY_RESOURCES"),
    (0x0b, "IRP_MN_QUERY_RESOURCE_REQUIREMENTS"),
    (0x0c, "IRP_MN_QUERY_DEVICE_TEXT"),
    (0x0d, "IRP_MN_FILTER_RESOURCE_REQUIREMENTS"),
    (0x0f, "IRP_MN_READ_CONFIG"),
    (0x10, "IRP_MN_WRITE_CONFIG"),
    (0x11, "IRP_MN_EJECT"),
    (0x12, "IRP_MN_SET_LOCK"),
    (0x13, "IRP_MN_QUERY_ID"),
    (0x14, "IRP_MN_QUERY_PNP_DEVICE_STATE"),
    (0x15, "IRP_MN_QUERY_BUS_INFORMATION"),
    (0x16, "IRP_MN_DEVICE_USAGE_NOTIFICATION"),
    (0x17, "IRP_MN_SURPRISE_REMOVAL"),
    (0x18, "IRP_MN_QUERY_LEGACY_BUS_INFORMATION"),
];

const TRANSACTION_MINORS: &[(u8, &str)] = &[
    (0, "BEGIN_TRANSACTION"),
    (1, "TRANSACTION_NOTIFY_PREPREPARE"),
    (2, "TRANSACTION_NOTIFY_PREPARE"),
    (3, "TRANSACTION_NOTIFY_COMMIT"),
    (4, "TRANSACTION_NOTIFY_ROLLBACK"),
    (5, "TRANSACTION_NOTIFY_PREPREPARE_COMPLETE"),
    // 6 is stored as COMMIT_COMPLETE; 7 has no label.
    (6, "TRANSACTION_NOTIFY_COMMIT_COMPLETE"),
    (8, "TRANSACTION_NOTIFY_ROLLBACK_COMPLETE"),
    (9, "TRANSACTION_NOTIFY_RECOVER"),
    (10, "TRANSACTION_NOTIFY_SINGLE_PHASE_COMMIT"),
    (11, "TRANSACTION_NOTIFY_DELEGATE_COMMIT"),
    (12, "TRANSACTION_NOTIFY_RECOVER_QUERY"),
    (13, "TRANSACTION_NOTIFY_ENLIST_PREPREPARE"),
    (14, "TRANSACTION_NOTIFY_LAST_RECOVER"),
    (15, "TRANSACTION_NOTIFY_INDOUBT"),
    (16, "TRANSACTION_NOTIFY_PROPAGATE_PULL"),
    (17, "TRANSACTION_NOTIFY_PROPAGATE_PUSH"),
    (18, "TRANSACTION_NOTIFY_MARSHAL"),
    (19, "TRANSACTION_NOTIFY_ENLIST_MASK"),
    (31, "TRANSACTION_NOTIFY_COMMIT_FINALIZE"),
];

const MAJORS: &[(u8, &str, Minors)] = &[
    (IRP_MJ_CREATE, "IRP_MJ_CREATE", Minors::None),
    (0x01, "IRP_MJ_CREATE_NAMED_PIPE", Minors::None),
    (IRP_MJ_CLOSE, "IRP_MJ_CLOSE", Minors::None),
    (IRP_MJ_READ, "IRP_MJ_READ", Minors::Irp(READ_WRITE_MINORS)),
    (IRP_MJ_WRITE, "IRP_MJ_WRITE", Minors::Irp(READ_WRITE_MINORS)),
    (0x05, "IRP_MJ_QUERY_INFORMATION", Minors::None),
    (0x06, "IRP_MJ_SET_INFORMATION", Minors::None),
    (0x07, "IRP_MJ_QUERY_EA", Minors::None),
    (0x08, "IRP_MJ_SET_EA", Minors::None),
    (0x09, "IRP_MJ_FLUSH_BUFFERS", Minors::None),
    (0x0a, "IRP_MJ_QUERY_VOLUME_INFORMATION", Minors::None),
    (0x0b, "IRP_MJ_SET_VOLUME_INFORMATION", Minors::None),
    (IRP_MJ_DIRECTORY_CONTROL, "IRP_MJ_DIRECTORY_CONTROL", Minors::Irp(DIRECTORY_MINORS)),
    (IRP_MJ_FILE_SYSTEM_CONTROL, "IRP_MJ_FILE_SYSTEM_CONTROL", Minors::Irp(FS_CONTROL_MINORS)),
    (IRP_MJ_DEVICE_CONTROL, "IRP_MJ_DEVICE_CONTROL", Minors::Irp(DEVICE_CONTROL_MINORS)),
    (0x0f, "IRP_MJ_INTERNAL_DEVICE_CONTROL", Minors::None),
    (0x10, "IRP_MJ_SHUTDOWN", Minors::None),
    (IRP_MJ_LOCK_CONTROL, "IRP_MJ_LOCK_CONTROL", Minors::Irp(LOCK_MINORS)),
    (0x12, "IRP_MJ_CLEANUP", Minors::None),
    (0x13, "IRP_MJ_CREATE_MAILSLOT", Minors::None),
    (0x14, "IRP_MJ_QUERY_SECURITY", Minors::None),
    (0x15, "IRP_MJ_SET_SECURITY", Minors::None),
    (IRP_MJ_POWER, "IRP_MJ_POWER", Minors::Irp(POWER_MINORS)),
    (IRP_MJ_SYSTEM_CONTROL, "IRP_MJ_SYSTEM_CONTROL", Minors::Irp(WMI_MINORS)),
    (0x18, "IRP_MJ_DEVICE_CHANGE", Minors::None),
    (0x19, "IRP_MJ_QUERY_QUOTA", Minors::None),
    (0x1a, "IRP_MJ_SET_QUOTA", Minors::None),
    (IRP_MJ_PNP, "IRP_MJ_PNP", Minors::Irp(PNP_MINORS)),
    (IRP_MJ_ACQUIRE_FOR_SECTION_SYNCHRONIZATION, "IRP_MJ_ACQUIRE_FOR_SECTION_SYNC", Minors::None),
    (IRP_MJ_RELEASE_FOR_SECTION_SYNCHRONIZATION, "IRP_MJ_RELEASE_FOR_SECTION_SYNC", Minors::None),
    (IRP_MJ_ACQUIRE_FOR_MOD_WRITE, "IRP_MJ_ACQUIRE_FOR_MOD_WRITE", Minors::None),
    (IRP_MJ_RELEASE_FOR_MOD_WRITE, "IRP_MJ_RELEASE_FOR_MOD_WRITE", Minors::None),
    (IRP_MJ_ACQUIRE_FOR_CC_FLUSH, "IRP_MJ_ACQUIRE_FOR_CC_FLUSH", Minors::None),
    (IRP_MJ_RELEASE_FOR_CC_FLUSH, "IRP_MJ_RELEASE_FOR_CC_FLUSH", Minors::None),
    (IRP_MJ_NOTIFY_STREAM_FO_CREATION, "IRP_MJ_NOTIFY_STREAM_FO_CREATION", Minors::None),
    (IRP_MJ_FAST_IO_CHECK_IF_POSSIBLE, "IRP_MJ_FAST_IO_CHECK_IF_POSSIBLE", Minors::None),
    (IRP_MJ_NETWORK_QUERY_OPEN, "IRP_MJ_NETWORK_QUERY_OPEN", Minors::None),
    (IRP_MJ_MDL_READ, "IRP_MJ_MDL_READ", Minors::None),
    (IRP_MJ_MDL_READ_COMPLETE, "IRP_MJ_MDL_READ_COMPLETE", Minors::None),
    (IRP_MJ_PREPARE_MDL_WRITE, "IRP_MJ_PREPARE_MDL_WRITE", Minors::None),
    (IRP_MJ_MDL_WRITE_COMPLETE, "IRP_MJ_MDL_WRITE_COMPLETE", Minors::None),
    (IRP_MJ_VOLUME_MOUNT, "IRP_MJ_VOLUME_MOUNT", Minors::None),
    (IRP_MJ_VOLUME_DISMOUNT, "IRP_MJ_VOLUME_DISMOUNT", Minors::None),
    (IRP_MJ_TRANSACTION_NOTIFY, "IRP_MJ_TRANSACTION_NOTIFY", Minors::Transaction(TRANSACTION_MINORS)),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpNames {
    pub major: Cow<'static, str>,
    pub minor: Option<Cow<'static, str>>,
}

fn lookup(table: &[(u8, &'static str)], code: u8) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, s)| *s)
}

/// Total over every `(major, minor)` pair: unknown codes get a label carrying the raw value.
pub fn classify(major: u8, minor: u8) -> OpNames {
    let Some((_, name, minors)) = MAJORS.iter().find(|(c, _, _)| *c == major) else {
        return OpNames { major: Cow::Owned(format!("Unknown Irp major function ({})", major)), minor: None };
    };
    let minor = match minors {
        Minors::None => None,
        Minors::Irp(t) => Some(lookup(t, minor).map(Cow::Borrowed).unwrap_or_else(|| Cow::Owned(format!("Unknown Irp minor code ({})", minor)))),
        Minors::Transaction(t) => Some(lookup(t, minor).map(Cow::Borrowed).unwrap_or_else(|| Cow::Owned(format!("Unknown Transaction notication code ({})", minor)))),
    };
    OpNames { major: Cow::Borrowed(name), minor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fltmgr_codes_wrap_from_max() {
        assert_eq!(IRP_MJ_ACQUIRE_FOR_SECTION_SYNCHRONIZATION, 255);
        assert_eq!(IRP_MJ_NOTIFY_STREAM_FO_CREATION, 249);
        assert_eq!(IRP_MJ_FAST_IO_CHECK_IF_POSSIBLE, 243);
        assert_eq!(IRP_MJ_VOLUME_DISMOUNT, 236);
        assert_eq!(IRP_MJ_TRANSACTION_NOTIFY, 216);
    }

    #[test]
    fn read_normal_labels() {
        let n = classify(IRP_MJ_READ, 0);
        assert_eq!(n.major, "IRP_MJ_READ");
        assert_eq!(n.minor.as_deref(), Some("IRP_MN_NORMAL"));
        assert_eq!(classify(IRP_MJ_WRITE, 7).minor.as_deref(), Some("IRP_MN_COMPLETE_MDL_DPC"));
    }

    #[test]
    fn majors_without_vocabulary_have_no_minor() {
        let n = classify(IRP_MJ_CREATE, 9);
        assert_eq!(n.major, "IRP_MJ_CREATE");
        assert_eq!(n.minor, None);
        assert_eq!(classify(IRP_MJ_MDL_READ, 0).major, "IRP_MJ_MDL_READ");
    }

    #[test]
    fn unknown_codes_fall_back_with_value() {
        assert_eq!(classify(0x40, 0).major, "Unknown Irp major function (64)");
        assert_eq!(classify(IRP_MJ_READ, 5).minor.as_deref(), Some("Unknown Irp minor code (5)"));
        assert_eq!(classify(IRP_MJ_PNP, 0x0e).minor.as_deref(), Some("Unknown Irp minor code (14)"));
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 20).minor.as_deref(), Some("Unknown Transaction notication code (20)"));
    }

    #[test]
    fn transaction_begin_and_finalize() {
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 0).minor.as_deref(), Some("BEGIN_TRANSACTION"));
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 31).minor.as_deref(), Some("TRANSACTION_NOTIFY_COMMIT_FINALIZE"));
    }

    #[test]
    fn transaction_complete_codes_keep_stored_labels() {
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 5).minor.as_deref(), Some("TRANSACTION_NOTIFY_PREPREPARE_COMPLETE"));
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 6).minor.as_deref(), Some("TRANSACTION_NOTIFY_COMMIT_COMPLETE"));
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 7).minor.as_deref(), Some("Unknown Transaction notication code (7)"));
        assert_eq!(classify(IRP_MJ_TRANSACTION_NOTIFY, 8).minor.as_deref(), Some("TRANSACTION_NOTIFY_ROLLBACK_COMPLETE"));
    }

    #[test]
    fn vocabulary_sizes() {
        assert_eq!(PNP_MINORS.len(), 24);
        assert_eq!(TRANSACTION_MINORS.len(), 20);
        assert_eq!(MAJORS.len(), 44);
    }

    #[test]
    fn classifier_is_total() {
        for major in 0..=255u8 {
            for minor in 0..=255u8 {
                let n = classify(major, minor);
                assert!(!n.major.is_empty());
                if let Some(m) = n.minor { assert!(!m.is_empty()); }
            }
        }
    }

    #[test]
    fn major_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (c, _, _) in MAJORS { assert!(seen.insert(*c), "duplicate major {}", c); }
    }
}
