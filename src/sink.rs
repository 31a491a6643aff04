use std::path::{Path, PathBuf};
use std::time::Duration;
use rusqlite::{params, Connection};
use crate::opcodes::OpNames;
use crate::record::LogRecord;

/// Bundled schema, applied once when the database file does not exist yet.
pub const SCHEMA: &str = include_str!("create.sql");

const INSERT_EVENT: &str = "INSERT INTO MinifilterLog (SeqNum, OprType, PreOpTime, PostOpTime, ProcessId, ProcessFilePath, ThreadId, MajorOp, MinorOp, IrpFlags, DeviceObj, FileObj, FileTransaction, OpStatus, Information, Arg1, Arg2, Arg3, Arg4, Arg5, Arg6, OpFileName, RequestorMode, RuleID, RuleAction) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)";
const INSERT_ALERT: &str = "INSERT INTO Alerts (Timestamp, AlertMessage) VALUES (?1, ?2)";

pub trait EventSink {
    fn record_event(&self, record: &LogRecord, names: &OpNames, irp_flags: &str);
    fn record_alert(&self, message: &str);
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bootstrap script for {0} is missing or empty")]
    EmptySchema(String),
    #[error("Failed to open database {path}: {source}")]
    Open { path: String, source: rusqlite::Error },
    #[error("SQL error: {0}")]
    Schema(rusqlite::Error),
    #[error("SQLite insert failed on {what}: {source}")]
    Insert { what: &'static str, source: rusqlite::Error },
}

/// Columns of one `MinifilterLog` row, already rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRow {
    pub seq_num: i64,
    pub opr_type: &'static str,
    pub pre_op_time: i64,
    pub post_op_time: i64,
    pub process_id: i64,
    pub process_file_path: String,
    pub thread_id: i64,
    pub major_op: String,
    pub minor_op: Option<String>,
    pub irp_flags: String,
    pub device_obj: String,
    pub file_obj: String,
    pub file_transaction: String,
    pub op_status: String,
    pub information: String,
    pub args: [i32; 5],
    pub arg6: i64,
    pub op_file_name: String,
    pub requestor_mode: &'static str,
    pub rule_id: i64,
}

pub fn pointer_hex(v: u64) -> String { format!("0x{:016X}", v) }

impl EventRow {
    pub fn build(record: &LogRecord, names: &OpNames, irp_flags: &str, process_file_path: String) -> Self {
        let d = &record.data;
        Self {
            seq_num: i64::from(record.sequence_number),
            opr_type: d.operation_origin(),
            pre_op_time: d.pre_op_unix_ticks(),
            post_op_time: d.post_op_unix_ticks(),
            process_id: d.process_id as i64,
            process_file_path,
            thread_id: d.thread_id as i64,
            major_op: names.major.to_string(),
            minor_op: names.minor.as_ref().map(|m| m.to_string()),
            irp_flags: irp_flags.to_string(),
            device_obj: pointer_hex(d.device_object),
            file_obj: pointer_hex(d.file_object),
            file_transaction: pointer_hex(d.transaction),
            op_status: crate::os_info::status_text(d.status),
            information: pointer_hex(d.information),
            // Arg1..Arg5 keep only their low 32 bits.
            args: [d.arg1, d.arg2, d.arg3, d.arg4, d.arg5].map(|a| a as u32 as i32),
            arg6: d.arg6,
            op_file_name: record.name.clone(),
            requestor_mode: d.requestor(),
            rule_id: i64::from(d.blocking_rule_id),
        }
    }
}

/// SQLite-backed sink. Every call opens its own connection and closes it before returning.
pub struct Store {
    path: PathBuf,
    schema: &'static str,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self::with_schema(path, SCHEMA) }

    pub fn with_schema(path: impl Into<PathBuf>, schema: &'static str) -> Self { Self { path: path.into(), schema } }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(|source| StoreError::Open { path: self.path.to_string_lossy().into_owned(), source })?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(|source| StoreError::Open { path: self.path.to_string_lossy().into_owned(), source })?;
        Ok(conn)
    }

    /// Creates the schema unless the database file already exists. Returns whether it did.
    pub fn ensure(&self) -> Result<bool, StoreError> {
        if self.path.is_file() { return Ok(false); }
        if self.schema.trim().is_empty() { return Err(StoreError::EmptySchema(self.path.to_string_lossy().into_owned())); }
        let conn = self.open()?;
        log::info!("Database does not exist. Initializing...");
        if let Err(e) = conn.execute_batch(self.schema) {
            drop(conn);
            discard_partial(&self.path);
            return Err(StoreError::Schema(e));
        }
        drop(conn);
        self.insert_alert("Database creation and initialization!")?;
        log::info!("Database initialized.");
        Ok(true)
    }

    pub fn insert_event(&self, row: &EventRow) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(INSERT_EVENT, params![
            row.seq_num, row.opr_type, row.pre_op_time, row.post_op_time,
            row.process_id, row.process_file_path, row.thread_id,
            row.major_op, row.minor_op, row.irp_flags,
            row.device_obj, row.file_obj, row.file_transaction,
            row.op_status, row.information,
            row.args[0], row.args[1], row.args[2], row.args[3], row.args[4], row.arg6,
            row.op_file_name, row.requestor_mode, row.rule_id, 0i64,
        ]).map_err(|source| StoreError::Insert { what: "Kernel Operation", source })?;
        Ok(())
    }

    pub fn insert_alert(&self, message: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(INSERT_ALERT, params![chrono::Utc::now().timestamp(), message])
            .map_err(|source| StoreError::Insert { what: "Alert", source })?;
        Ok(())
    }
}

/// Removes a database file whose schema never applied. Returns false, after logging, if it is still there.
fn discard_partial(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            log::error!("Failed to remove partially initialized database {}: {}", path.display(), e);
            false
        }
    }
}

impl EventSink for Store {
    fn record_event(&self, record: &LogRecord, names: &OpNames, irp_flags: &str) {
        if let Err(e) = self.ensure() { log::error!("{}", e); return; }
        let row = EventRow::build(record, names, irp_flags, crate::os_info::process_image_path(record.data.process_id));
        if let Err(e) = self.insert_event(&row) { log::error!("{}", e); }
    }

    fn record_alert(&self, message: &str) {
        if let Err(e) = self.ensure() { log::error!("{}", e); return; }
        if let Err(e) = self.insert_alert(message) { log::error!("{}", e); }
    }
}
