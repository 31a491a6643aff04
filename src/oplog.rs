use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

/// Log target that opens the operational log, appends and closes it again on every write.
pub struct AppendPerWrite {
    path: PathBuf,
}

impl AppendPerWrite {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl Write for AppendPerWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        f.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// `[HH:MM:SS] message`, the line format of the operational log.
pub fn format_line(time: chrono::NaiveTime, msg: &str) -> String {
    format!("[{}] {}", time.format("%H:%M:%S"), msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_is_clock_then_message() {
        let t = chrono::NaiveTime::from_hms_opt(7, 5, 9).unwrap();
        assert_eq!(format_line(t, "Database initialized."), "[07:05:09] Database initialized.");
    }

    #[test]
    fn each_write_appends_and_releases_the_file() {
        let p = std::env::temp_dir().join(format!("minispy_oplog_{}.log", std::process::id()));
        let _ = std::fs::remove_file(&p);
        let mut w = AppendPerWrite::new(&p);
        w.write_all(b"one\n").unwrap();
        std::fs::rename(&p, p.with_extension("old")).unwrap();
        w.write_all(b"two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "two\n");
        assert_eq!(std::fs::read_to_string(p.with_extension("old")).unwrap(), "one\n");
        let _ = std::fs::remove_file(&p);
        let _ = std::fs::remove_file(p.with_extension("old"));
    }
}
