//! tagrw: read and overwrite NFC tags from the command line
//!
//! The binary is a thin front end over `tagrw-host`. Notifications and
//! results go to stdout (or any writer, see [`run_with_output`]), logs go
//! to stderr.

pub mod error;
pub mod script;
pub mod tracing_support;

pub use error::{CliError, SystemError, UserError};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tagrw_api::{Detection, NdefMessage, PermissionState, TagRecord};
use tagrw_host::driver;
use tagrw_host::permission::{
    AutoConsentHandler, ConsentHandler, PermissionGate, SimulatedPermissions,
    TerminalConsentHandler,
};
use tagrw_host::{
    AssetCache, JsonLinesObserver, MapFetcher, RecordCodec, SessionConfig, SessionSnapshot,
    SimulatedReader, TagSession,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use script::ScriptCommand;
use tracing_support::TracingFormat;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "tagrw", version, about = "Read and overwrite NFC tags")]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = TracingFormat::Pretty)]
    pub log_format: TracingFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Normalize a URL the way armed URL writes do
    Normalize {
        input: String,
    },

    /// Decode a single record
    Decode(DecodeArgs),

    /// Drive a session over a simulated reader
    Simulate(SimulateArgs),

    /// Install the offline asset cache and resolve URLs against it
    Cache {
        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Record type as reported by the host (text, url, empty, mime, ...)
    #[arg(long = "type", default_value = "text")]
    pub record_type: String,

    /// Text encoding label of the record
    #[arg(long)]
    pub encoding: Option<String>,

    /// Encoding used when the record has no label
    #[arg(long, default_value = "utf-8")]
    pub default_encoding: String,

    /// Payload as hex digits
    #[arg(long, conflicts_with = "text")]
    pub hex: Option<String>,

    /// Payload as text
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsentMode {
    Allow,
    Deny,
    /// Prompt on the terminal (needs --script)
    Ask,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Initial host permission state
    #[arg(long, default_value = "granted")]
    pub permission: PermissionState,

    /// Read commands from a file instead of stdin
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Make scan requests fail
    #[arg(long)]
    pub reject_scan: bool,

    /// Fail the first N writes
    #[arg(long, default_value_t = 0)]
    pub fail_writes: usize,

    /// Answer to the "Enable NFC" prompt
    #[arg(long, value_enum, default_value_t = ConsentMode::Allow)]
    pub consent: ConsentMode,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Commands
// ============================================================================

/// Run a parsed command line, writing results to stdout
pub async fn run(cli: Cli) -> Result<(), CliError> {
    run_with_output(cli, std::io::stdout()).await
}

/// Run a parsed command line, writing results and notifications to `out`
pub async fn run_with_output<W>(cli: Cli, out: W) -> Result<(), CliError>
where
    W: Write + Send + 'static,
{
    let mut out = SharedOutput::new(out);
    match cli.command {
        Command::Normalize { input } => {
            writeln!(out, "{}", tagrw_host::url::normalize(&input))?;
            Ok(())
        }
        Command::Decode(args) => {
            writeln!(out, "{}", decode(&args)?)?;
            Ok(())
        }
        Command::Simulate(args) => simulate(args, out).await,
        Command::Cache { config, urls } => cache(config, urls, out).await,
    }
}

/// Output shared between the command and the session observer
struct SharedOutput<W>(Arc<Mutex<W>>);

impl<W> SharedOutput<W> {
    fn new(writer: W) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl<W> Clone for SharedOutput<W> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<W: Write> Write for SharedOutput<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

/// `<Label>: <text>`, or just the label when the record has no text
pub fn decode(args: &DecodeArgs) -> Result<String, CliError> {
    let data = match (&args.hex, &args.text) {
        (Some(digits), _) => {
            let digits: String = digits.split_whitespace().collect();
            hex::decode(&digits).map_err(|e| {
                CliError::User(UserError::InvalidArgument {
                    arg: "--hex".into(),
                    reason: e.to_string(),
                })
            })?
        }
        (None, Some(text)) => text.clone().into_bytes(),
        (None, None) => Vec::new(),
    };

    let mut record = TagRecord::new(args.record_type.as_str(), data);
    if let Some(label) = &args.encoding {
        record = record.with_encoding(label.as_str());
    }

    let codec = RecordCodec::with_default_encoding(&args.default_encoding);
    let outcome = codec.decode_message(&Detection::new(NdefMessage::single(record)));
    Ok(match outcome.display_text() {
        Some(text) => format!("{}: {}", outcome.label(), text),
        None => outcome.label().to_string(),
    })
}

#[derive(Serialize)]
struct StatusLine<'a> {
    event: &'static str,
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

async fn simulate<W>(args: SimulateArgs, mut out: SharedOutput<W>) -> Result<(), CliError>
where
    W: Write + Send + 'static,
{
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| SessionConfig::default_path("tagrw"));
    let config = SessionConfig::load_or_default(Some(config_path.as_path()))?;

    let consent: Arc<dyn ConsentHandler> = match args.consent {
        ConsentMode::Allow => Arc::new(AutoConsentHandler::always_allow()),
        ConsentMode::Deny => Arc::new(AutoConsentHandler::always_deny()),
        ConsentMode::Ask if args.script.is_none() => {
            return Err(CliError::User(UserError::InvalidArgument {
                arg: "--consent ask".into(),
                reason: "Commands are read from stdin; pass --script to prompt".into(),
            }))
        }
        ConsentMode::Ask => Arc::new(TerminalConsentHandler::new()),
    };

    let host = SimulatedPermissions::for_topic(config.permission_topic.as_str(), args.permission);
    let (sender, inbox) = driver::channel(config.event_buffer);
    let reader = Arc::new(SimulatedReader::with_sink(sender.reader_sink()));
    reader.reject_scans(args.reject_scan);
    reader.fail_next_writes(args.fail_writes);

    let mut gate = PermissionGate::from_host(Some(&host), &config.permission_topic, true).await;
    let changes = gate.take_changes();
    let granted = gate.current_state().is_granted();
    let observer = Arc::new(JsonLinesObserver::new(out.clone()));
    let session = TagSession::new(gate, reader.clone(), observer)
        .with_codec(RecordCodec::with_default_encoding(
            &config.default_text_encoding,
        ))
        .with_consent(consent);
    let handle = driver::spawn(session, inbox, changes);

    // Already authorized: scan right away
    if granted {
        sender.start().await?;
        sender.snapshot().await?;
    }

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.script {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = input.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(command) = script::parse_line(line_no, &line)? else {
            continue;
        };
        tracing::debug!(line = line_no, command = ?command, "Script command");

        match command {
            ScriptCommand::Tag(detection) => {
                if !reader.present(detection).await {
                    tracing::warn!(line = line_no, "Reader is not scanning, tag ignored");
                }
            }
            ScriptCommand::TagError(reason) => {
                if !reader.present_unreadable(reason).await {
                    tracing::warn!(line = line_no, "Reader is not scanning, tag ignored");
                }
            }
            ScriptCommand::Arm(payload) => sender.arm_write(payload).await?,
            ScriptCommand::Cancel => sender.cancel_write().await?,
            ScriptCommand::Enable => sender.enable().await?,
            ScriptCommand::Start => sender.start().await?,
            ScriptCommand::Permission(state) => host.set(state),
            ScriptCommand::FailWrites(count) => reader.fail_next_writes(count),
            ScriptCommand::Status => {
                let snapshot = sender.snapshot().await?;
                let line = StatusLine {
                    event: "status",
                    snapshot: &snapshot,
                };
                writeln!(out, "{}", serde_json::to_string(&line)?)?;
                continue;
            }
            ScriptCommand::Quit => break,
        }

        // Wait until the session has caught up so output follows the script
        sender.snapshot().await?;
    }

    sender.shutdown().await?;
    let session = handle.await?;
    tracing::info!(mode = %session.mode(), lines = line_no, "Simulation finished");
    out.flush()?;
    Ok(())
}

async fn cache<W: Write>(
    config: Option<PathBuf>,
    urls: Vec<String>,
    mut out: SharedOutput<W>,
) -> Result<(), CliError> {
    let path = config.unwrap_or_else(|| SessionConfig::default_path("tagrw"));
    let config = SessionConfig::load_or_default(Some(path.as_path()))?;

    let fetcher = Arc::new(MapFetcher::serving(config.cache.manifest.clone()));
    let cache = AssetCache::new(config.cache, fetcher);
    let installed = cache.install().await?;
    let purged = cache.activate().await;
    tracing::info!(installed, purged = purged.len(), version = cache.version(), "Cache ready");

    for url in &urls {
        let resolution = cache.respond(url).await?;
        match resolution.asset() {
            Some(asset) => writeln!(
                out,
                "{}\t{}\t{} bytes",
                resolution.label(),
                url,
                asset.body.len()
            )?,
            None => writeln!(out, "{}\t{}", resolution.label(), url)?,
        }
    }
    out.flush()?;
    Ok(())
}
