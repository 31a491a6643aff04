use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
mod opcodes;
mod record;
mod decoder;
mod flags;
mod sink;
mod oplog;
mod os_info;
mod channel;
mod poll;

#[cfg(target_os = "windows")]
const DEFAULT_DB_PATH: &str = r"C:\Users\Public\log.db";
#[cfg(not(target_os = "windows"))]
const DEFAULT_DB_PATH: &str = "./log.db";
#[cfg(target_os = "windows")]
const DEFAULT_OPLOG_PATH: &str = r"C:\Users\Public\MySimpleCService.log";
#[cfg(not(target_os = "windows"))]
const DEFAULT_OPLOG_PATH: &str = "./minispy.log";
const DEFAULT_PORT: &str = r"\MiniSpyPort";
const DEFAULT_POLL_MS: u64 = 200;
const DEFAULT_CONFIG: &str = "MiniSpyLog.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "MiniSpyLog",
    about = "User-mode collector for the minispy file system filter",
    long_about = "Polls the minispy filter communication port, decodes each batch of operation records and stores them in a SQLite database.",
    after_long_help = "Examples:\n  MiniSpyLog\n  MiniSpyLog --screen --no-db\n  MiniSpyLog --db-path D:\\spy.db --output spy.tsv\n  MiniSpyLog --poll-interval-ms 500 -vv",
    color = ColorChoice::Auto
)]
struct Args {
    #[arg(long, default_value = DEFAULT_DB_PATH, help = "SQLite database receiving events and alerts")]
    db_path: String,
    #[arg(long, default_value = DEFAULT_OPLOG_PATH, help = "Operational log file; empty logs to stderr")]
    oplog_path: String,
    #[arg(long, help = "Also write every record as a tab-separated line to this file")]
    output: Option<String>,
    #[arg(long, default_value_t = false, help = "Print every record to stdout")]
    screen: bool,
    #[arg(long, default_value_t = false, help = "Do not write events to the database")]
    no_db: bool,
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,
    #[arg(long, default_value_t = DEFAULT_POLL_MS)]
    poll_interval_ms: u64,
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            oplog_path: DEFAULT_OPLOG_PATH.to_string(),
            output: None,
            screen: false,
            no_db: false,
            port: DEFAULT_PORT.to_string(),
            poll_interval_ms: DEFAULT_POLL_MS,
            config: None,
            log_level: None,
            log_format: None,
            verbose: 0,
            quiet: false,
            completions: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct AppConfig {
    db_path: Option<String>,
    oplog_path: Option<String>,
    output: Option<String>,
    screen: Option<bool>,
    no_db: Option<bool>,
    port: Option<String>,
    poll_interval_ms: Option<u64>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
}

fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(sh, &mut cmd, "MiniSpyLog", &mut std::io::stdout());
        return Ok(());
    }
    let cfg_path = args.config.clone().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    if let Ok(s) = std::fs::read_to_string(&cfg_path) {
        let cfg = toml::from_str::<AppConfig>(&s).with_context(|| format!("Invalid config {}", cfg_path))?;
        apply_config(&mut args, cfg);
    } else if args.config.is_some() {
        anyhow::bail!("Could not read config {}", cfg_path);
    }
    init_logging(&args);

    let output = match args.output.as_ref() {
        Some(p) => Some(std::fs::File::create(p).with_context(|| format!("Could not open output file {}", p))?),
        None => None,
    };
    let ctx = Arc::new(poll::LogContext::new(args.screen, !args.no_db, Duration::from_millis(args.poll_interval_ms), output));
    let store = sink::Store::new(&args.db_path);
    log::info!("Connecting to filter port {}", args.port);
    let mut port = channel::FilterPort::connect(&args.port).with_context(|| format!("Could not connect to filter: {}", args.port))?;

    let worker = {
        let ctx = Arc::clone(&ctx);
        std::thread::Builder::new()
            .name("minispy-poll".into())
            .spawn(move || {
                if poll::poll_loop(&ctx, &mut port, &store, std::thread::sleep) == poll::PollExit::ProducerGone {
                    std::process::exit(0);
                }
            })
            .context("Could not create logging thread")?
    };

    println!("Logging to {}. Type q to stop.", if args.no_db { "screen/output only" } else { args.db_path.as_str() });
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "q" | "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown command: {}", other),
        }
    }

    ctx.request_shutdown();
    if ctx.shutdown.wait(Duration::from_secs(5)) {
        let _ = worker.join();
    } else {
        log::warn!("Poll thread did not stop within 5 seconds");
    }
    Ok(())
}

fn level_filter(args: &Args) -> Option<log::LevelFilter> {
    if args.quiet { return Some(log::LevelFilter::Error); }
    if let Some(lvl) = args.log_level {
        return Some(match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace });
    }
    match args.verbose {
        0 => None,
        1 => Some(log::LevelFilter::Info),
        2 => Some(log::LevelFilter::Debug),
        _ => Some(log::LevelFilter::Trace),
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(f) = level_filter(args) { builder.filter_level(f); }
    let to_file = !args.oplog_path.is_empty();
    match args.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                use std::io::Write;
                let obj = serde_json::json!({
                    "ts": chrono::Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        _ if to_file => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(buf, "{}", oplog::format_line(chrono::Local::now().time(), &record.args().to_string()))
            });
        }
        _ => {
            builder.format(|buf, record| {
                use std::io::Write;
                let ts = chrono::Local::now().format("%H:%M:%S");
                writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
            });
        }
    }
    if to_file { builder.target(env_logger::Target::Pipe(Box::new(oplog::AppendPerWrite::new(&args.oplog_path)))); }
    builder.init();
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.db_path == DEFAULT_DB_PATH && let Some(v) = cfg.db_path { args.db_path = v; }
    if args.oplog_path == DEFAULT_OPLOG_PATH && let Some(v) = cfg.oplog_path { args.oplog_path = v; }
    if args.output.is_none() && let Some(v) = cfg.output { args.output = Some(v); }
    if !args.screen && let Some(v) = cfg.screen { args.screen = v; }
    if !args.no_db && let Some(v) = cfg.no_db { args.no_db = v; }
    if args.port == DEFAULT_PORT && let Some(v) = cfg.port { args.port = v; }
    if args.poll_interval_ms == DEFAULT_POLL_MS && let Some(v) = cfg.poll_interval_ms { args.poll_interval_ms = v; }
    if args.log_level.is_none() && let Some(v) = cfg.log_level { args.log_level = Some(v); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
}
