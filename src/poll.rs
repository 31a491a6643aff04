use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use crate::channel::{ChannelStatus, LogChannel};
use crate::decoder;
use crate::flags::format_irp_flags;
use crate::opcodes::{classify, OpNames};
use crate::record::LogRecord;
use crate::sink::{pointer_hex, EventSink};

/// Receive buffer handed to the channel on every cycle.
pub const BUFFER_SIZE: usize = 64 * 1024;

pub const ALERT_PRODUCER_GONE: &str = "The kernel component of minispy has unloaded. Exiting";
pub const ALERT_SHUTTING_DOWN: &str = "Log: Shutting down";
pub const ALERT_ALL_DONE: &str = "Log: All done";

/// One-shot signal the poll thread raises once it has left its loop.
#[derive(Default)]
pub struct ShutdownSignal {
    released: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    pub fn release(&self) {
        let mut g = match self.released.lock() { Ok(g) => g, Err(p) => p.into_inner() };
        *g = true;
        self.cv.notify_all();
    }

    /// Waits up to `timeout`; true if the signal was released.
    pub fn wait(&self, timeout: Duration) -> bool {
        let g = match self.released.lock() { Ok(g) => g, Err(p) => p.into_inner() };
        match self.cv.wait_timeout_while(g, timeout, |released| !*released) {
            Ok((g, _)) => *g,
            Err(p) => *p.into_inner().0,
        }
    }
}

/// State shared by the controller and the poll thread. After start only `cleaning_up` and `shutdown` change.
pub struct LogContext {
    pub log_to_screen: bool,
    pub log_to_file: bool,
    pub poll_interval: Duration,
    pub output: Option<Mutex<File>>,
    pub cleaning_up: AtomicBool,
    pub shutdown: ShutdownSignal,
}

impl LogContext {
    pub fn new(log_to_screen: bool, log_to_file: bool, poll_interval: Duration, output: Option<File>) -> Self {
        Self { log_to_screen, log_to_file, poll_interval, output: output.map(Mutex::new), cleaning_up: AtomicBool::new(false), shutdown: ShutdownSignal::default() }
    }

    pub fn request_shutdown(&self) { self.cleaning_up.store(true, Ordering::SeqCst); }

    fn write_output(&self, line: &str) {
        let Some(out) = &self.output else { return };
        let mut f = match out.lock() { Ok(f) => f, Err(p) => p.into_inner() };
        if let Err(e) = writeln!(f, "{}", line) { log::warn!("Failed to write output file: {}", e); }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The shutdown flag was observed; lifecycle alerts were written and the signal released.
    Shutdown,
    /// The producer unloaded. The caller is expected to end the process.
    ProducerGone,
}

pub fn screen_line(rec: &LogRecord, names: &OpNames, flags: &str) -> String {
    let d = &rec.data;
    format!("{:08X} {} {} {} {} {}:{} {:08X} {}",
        rec.sequence_number, d.operation_origin(), names.major, names.minor.as_deref().unwrap_or(""),
        flags, d.process_id, d.thread_id, d.status, rec.name)
}

pub fn file_line(rec: &LogRecord, names: &OpNames, flags: &str) -> String {
    let d = &rec.data;
    [
        format!("0x{:08X}", rec.sequence_number),
        d.operation_origin().to_string(),
        d.pre_op_unix_ticks().to_string(),
        d.post_op_unix_ticks().to_string(),
        d.process_id.to_string(),
        d.thread_id.to_string(),
        names.major.to_string(),
        names.minor.as_deref().unwrap_or("").to_string(),
        flags.to_string(),
        pointer_hex(d.device_object),
        pointer_hex(d.file_object),
        pointer_hex(d.transaction),
        format!("0x{:08X}", d.status),
        pointer_hex(d.information),
        format!("0x{:X}", d.arg1),
        format!("0x{:X}", d.arg2),
        format!("0x{:X}", d.arg3),
        format!("0x{:X}", d.arg4),
        format!("0x{:X}", d.arg5),
        d.arg6.to_string(),
        d.ecp_count.to_string(),
        format!("0x{:08X}", d.known_ecp_mask),
        d.requestor().to_string(),
        rec.name.clone(),
    ].join("\t")
}

fn dispatch<S: EventSink + ?Sized>(ctx: &LogContext, rec: &LogRecord, sink: &S) {
    let names = classify(rec.data.major, rec.data.minor);
    let flags = format_irp_flags(rec.data.irp_flags, rec.data.major);
    log::trace!("record {} {} {}", rec.sequence_number, names.major, flags);
    if ctx.log_to_screen { println!("{}", screen_line(rec, &names, &flags)); }
    ctx.write_output(&file_line(rec, &names, &flags));
    if let Some(msg) = rec.memory_condition() {
        if ctx.log_to_screen { println!("M:  {:08X} {}", rec.sequence_number, msg); }
        ctx.write_output(&format!("M:\t0x{:08X}\t{}", rec.sequence_number, msg));
        if ctx.log_to_file { sink.record_alert(&format!("M:\t0x{:08X}\t{}", rec.sequence_number, msg)); }
        return;
    }
    if ctx.log_to_file { sink.record_event(rec, &names, &flags); }
}

/// Decodes one batch and hands every record on, in buffer order. Returns how many records were dispatched.
pub fn process_batch<S: EventSink + ?Sized>(ctx: &LogContext, buf: &mut [u8], bytes_returned: usize, sink: &S) -> usize {
    let mut records = decoder::decode(buf, bytes_returned);
    let mut n = 0;
    for item in records.by_ref() {
        match item {
            Ok(rec) => { dispatch(ctx, &rec, sink); n += 1; }
            Err(e) => {
                log::error!("{}", e);
                sink.record_alert(&e.to_string());
            }
        }
    }
    if records.skipped() > 0 { log::warn!("Skipped {} reparse records with an unrecognized tag", records.skipped()); }
    log::debug!("batch: {} bytes, {} used, {} records", bytes_returned, records.used(), n);
    n
}

pub fn poll_loop<C, S>(ctx: &LogContext, channel: &mut C, sink: &S, mut sleep: impl FnMut(Duration)) -> PollExit
where C: LogChannel + ?Sized, S: EventSink + ?Sized {
    let mut buf = vec![0u8; BUFFER_SIZE];
    log::info!("Log: Starting up");
    while !ctx.cleaning_up.load(Ordering::SeqCst) {
        match channel.get_log(&mut buf) {
            ChannelStatus::HandleInvalid => {
                log::error!("{}", ALERT_PRODUCER_GONE);
                sink.record_alert(ALERT_PRODUCER_GONE);
                return PollExit::ProducerGone;
            }
            ChannelStatus::NoMoreItems => sleep(ctx.poll_interval),
            ChannelStatus::Failed(hr) => {
                let msg = format!("UNEXPECTED ERROR received: {:x}", hr as u32);
                log::error!("{}", msg);
                sink.record_alert(&msg);
                sleep(ctx.poll_interval);
            }
            ChannelStatus::Data(0) => sleep(ctx.poll_interval),
            ChannelStatus::Data(n) => { process_batch(ctx, &mut buf, n, sink); }
        }
    }
    log::info!("{}", ALERT_SHUTTING_DOWN);
    sink.record_alert(ALERT_SHUTTING_DOWN);
    log::info!("{}", ALERT_ALL_DONE);
    sink.record_alert(ALERT_ALL_DONE);
    ctx.shutdown.release();
    PollExit::Shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use crate::channel::HR_NO_MORE_ITEMS;
    use crate::record::{encode_record, wide, RecordData, RECORD_TYPE_FLAG_OUT_OF_MEMORY, RECORD_TYPE_FLAG_EXCEED_MEMORY_ALLOWANCE, FLT_CALLBACK_DATA_IRP_OPERATION};

    /// Replays canned responses; once empty it raises the shutdown flag.
    struct Scripted<'a> {
        steps: VecDeque<(ChannelStatus, Vec<u8>)>,
        ctx: &'a LogContext,
        calls: usize,
    }

    impl LogChannel for Scripted<'_> {
        fn get_log(&mut self, buf: &mut [u8]) -> ChannelStatus {
            self.calls += 1;
            let Some((status, bytes)) = self.steps.pop_front() else {
                self.ctx.request_shutdown();
                return ChannelStatus::NoMoreItems;
            };
            buf[..bytes.len()].copy_from_slice(&bytes);
            status
        }
    }

    #[derive(Default)]
    struct Recording {
        events: RefCell<Vec<(u32, String, Option<String>, String)>>,
        alerts: RefCell<Vec<String>>,
    }

    impl EventSink for Recording {
        fn record_event(&self, rec: &LogRecord, names: &OpNames, irp_flags: &str) {
            self.events.borrow_mut().push((rec.sequence_number, names.major.to_string(), names.minor.as_ref().map(|m| m.to_string()), irp_flags.to_string()));
        }
        fn record_alert(&self, message: &str) { self.alerts.borrow_mut().push(message.to_string()); }
    }

    fn ctx() -> LogContext { LogContext::new(false, true, Duration::from_millis(200), None) }

    fn read_nocache(seq: u32, record_type: u32) -> Vec<u8> {
        let data = RecordData { major: 3, minor: 0, irp_flags: 1, flags: FLT_CALLBACK_DATA_IRP_OPERATION, ..Default::default() };
        encode_record(seq, record_type, &data, &[])
    }

    fn run(ctx: &LogContext, steps: Vec<(ChannelStatus, Vec<u8>)>) -> (PollExit, Recording, Vec<Duration>, usize) {
        let sink = Recording::default();
        let mut ch = Scripted { steps: steps.into(), ctx, calls: 0 };
        let mut sleeps = Vec::new();
        let exit = poll_loop(ctx, &mut ch, &sink, |d| sleeps.push(d));
        (exit, sink, sleeps, ch.calls)
    }

    #[test]
    fn single_read_record_is_persisted() {
        let c = ctx();
        let rec = read_nocache(1, 0);
        let (exit, sink, _, _) = run(&c, vec![(ChannelStatus::Data(rec.len()), rec)]);
        assert_eq!(exit, PollExit::Shutdown);
        assert_eq!(*sink.events.borrow(), vec![(1, "IRP_MJ_READ".to_string(), Some("IRP_MN_NORMAL".to_string()), "N-------".to_string())]);
    }

    #[test]
    fn empty_batch_sleeps_without_decoding() {
        let c = ctx();
        let (_, sink, sleeps, _) = run(&c, vec![(ChannelStatus::Data(0), Vec::new())]);
        assert!(sink.events.borrow().is_empty());
        assert_eq!(sleeps[0], Duration::from_millis(200));
        assert_eq!(*sink.alerts.borrow(), vec![ALERT_SHUTTING_DOWN, ALERT_ALL_DONE]);
    }

    #[test]
    fn producer_gone_stops_immediately() {
        let c = ctx();
        let rec = read_nocache(1, 0);
        let (exit, sink, sleeps, calls) = run(&c, vec![(ChannelStatus::HandleInvalid, Vec::new()), (ChannelStatus::Data(rec.len()), rec)]);
        assert_eq!(exit, PollExit::ProducerGone);
        assert_eq!(calls, 1);
        assert!(sleeps.is_empty());
        assert!(sink.events.borrow().is_empty());
        assert_eq!(*sink.alerts.borrow(), vec![ALERT_PRODUCER_GONE]);
        assert!(!c.shutdown.wait(Duration::from_millis(1)));
    }

    #[test]
    fn out_of_memory_record_is_alert_only() {
        let c = ctx();
        let rec = read_nocache(0x2A, RECORD_TYPE_FLAG_OUT_OF_MEMORY);
        let (_, sink, _, _) = run(&c, vec![(ChannelStatus::Data(rec.len()), rec)]);
        assert!(sink.events.borrow().is_empty());
        assert_eq!(sink.alerts.borrow()[0], "M:\t0x0000002A\tSystem Out of Memory");
        assert_eq!(sink.alerts.borrow().len(), 3);
    }

    #[test]
    fn exceeded_allowance_uses_its_own_text() {
        let c = ctx();
        let rec = read_nocache(7, RECORD_TYPE_FLAG_EXCEED_MEMORY_ALLOWANCE);
        let (_, sink, _, _) = run(&c, vec![(ChannelStatus::Data(rec.len()), rec)]);
        assert_eq!(sink.alerts.borrow()[0], "M:\t0x00000007\tExceeded Mamimum Allowed Memory Buffers");
    }

    #[test]
    fn database_logging_off_writes_no_rows() {
        let c = LogContext::new(false, false, Duration::from_millis(200), None);
        let mut batch = read_nocache(1, 0);
        batch.extend(read_nocache(2, RECORD_TYPE_FLAG_OUT_OF_MEMORY));
        let (_, sink, _, _) = run(&c, vec![(ChannelStatus::Data(batch.len()), batch)]);
        assert!(sink.events.borrow().is_empty());
        assert_eq!(*sink.alerts.borrow(), vec![ALERT_SHUTTING_DOWN, ALERT_ALL_DONE]);
    }

    #[test]
    fn transient_errors_are_alerted_and_retried() {
        let c = ctx();
        let rec = read_nocache(9, 0);
        let (_, sink, sleeps, _) = run(&c, vec![
            (ChannelStatus::Failed(0x8007_0005u32 as i32), Vec::new()),
            (ChannelStatus::from_hresult(HR_NO_MORE_ITEMS, 0), Vec::new()),
            (ChannelStatus::Data(rec.len()), rec),
        ]);
        assert_eq!(sink.alerts.borrow()[0], "UNEXPECTED ERROR received: 80070005");
        assert_eq!(sink.alerts.borrow().len(), 3);
        assert_eq!(sleeps.len(), 3);
        assert_eq!(sink.events.borrow().len(), 1);
    }

    #[test]
    fn framing_violation_drops_rest_of_batch() {
        let c = ctx();
        let mut batch = read_nocache(1, 0);
        let mut bad = read_nocache(2, 0);
        bad[..4].copy_from_slice(&10u32.to_le_bytes());
        batch.extend(bad);
        batch.extend(read_nocache(3, 0));
        let (_, sink, _, _) = run(&c, vec![(ChannelStatus::Data(batch.len()), batch)]);
        assert_eq!(sink.events.borrow().len(), 1);
        assert_eq!(sink.alerts.borrow()[0], "UNEXPECTED LOG_RECORD->Length: length=10 expected>=162");
    }

    #[test]
    fn records_keep_buffer_order() {
        let c = ctx();
        let mut batch = Vec::new();
        for seq in [5, 3, 9] { batch.extend(read_nocache(seq, 0)); }
        let (_, sink, _, _) = run(&c, vec![(ChannelStatus::Data(batch.len()), batch)]);
        let seqs: Vec<u32> = sink.events.borrow().iter().map(|e| e.0).collect();
        assert_eq!(seqs, vec![5, 3, 9]);
    }

    #[test]
    fn shutdown_before_first_cycle_releases_signal() {
        let c = ctx();
        c.request_shutdown();
        let (exit, sink, _, calls) = run(&c, Vec::new());
        assert_eq!(exit, PollExit::Shutdown);
        assert_eq!(calls, 0);
        assert_eq!(*sink.alerts.borrow(), vec![ALERT_SHUTTING_DOWN, ALERT_ALL_DONE]);
        assert!(c.shutdown.wait(Duration::from_millis(1)));
    }

    #[test]
    fn output_file_gets_tab_separated_lines() {
        let p = std::env::temp_dir().join(format!("minispy_output_{}.txt", std::process::id()));
        let c = LogContext::new(false, false, Duration::from_millis(200), Some(File::create(&p).unwrap()));
        let data = RecordData { major: 0, flags: FLT_CALLBACK_DATA_IRP_OPERATION, ..Default::default() };
        let mut batch = encode_record(4, 0, &data, &wide("C:\\a.txt"));
        batch.extend(read_nocache(5, RECORD_TYPE_FLAG_OUT_OF_MEMORY));
        run(&c, vec![(ChannelStatus::Data(batch.len()), batch)]);
        drop(c);
        let text = std::fs::read_to_string(&p).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let cols: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(cols[0], "0x00000004");
        assert_eq!(cols[6], "IRP_MJ_CREATE");
        assert_eq!(*cols.last().unwrap(), "C:\\a.txt");
        assert_eq!(lines[2], "M:\t0x00000005\tSystem Out of Memory");
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn screen_line_shows_key_fields() {
        let data = RecordData { major: 3, minor: 0, irp_flags: 1, process_id: 4, thread_id: 8, flags: FLT_CALLBACK_DATA_IRP_OPERATION, ..Default::default() };
        let rec = LogRecord { sequence_number: 0x10, record_type: 0, length: 162, data, name: "x".into() };
        assert_eq!(screen_line(&rec, &classify(3, 0), "N-------"), "00000010 IRP IRP_MJ_READ IRP_MN_NORMAL N------- 4:8 00000000 x");
    }
}
