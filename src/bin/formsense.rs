//! Formsense CLI - replay and inspect form tracking offline
//!
//! Commands:
//! - replay: Drive a tracker over a page fixture with an NDJSON event script
//! - order: Print the field numbering of a page's form
//! - hash: Print the content hash of a value

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use formsense::field::number_controls;
use formsense::script::{parse_script, PageFixture, Replay};
use formsense::transport::{Delivery, HttpTransport, OfflineTransport, Transport};
use formsense::{content_hash, Clock, SystemClock, TrackerConfig, TrackerError, FORMSENSE_VERSION, PRODUCER_NAME};

/// Formsense - behavioral telemetry for a single web form
#[derive(Parser)]
#[command(name = "formsense")]
#[command(version = FORMSENSE_VERSION)]
#[command(about = "Replay and inspect form interaction tracking", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an event script against a page fixture
    Replay {
        /// Page fixture (JSON)
        #[arg(short, long)]
        page: PathBuf,

        /// Event script (NDJSON, use - for stdin)
        #[arg(short, long)]
        script: PathBuf,

        /// Tracker configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pixel id (overrides the configuration file)
        #[arg(long)]
        pixel_id: Option<String>,

        /// Collector host (overrides the configuration file)
        #[arg(long)]
        api_host: Option<String>,

        /// Suppress raw field values
        #[arg(long)]
        no_raw_data: bool,

        /// Answer requests in-process and print them instead of posting
        #[arg(long)]
        dry_run: bool,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Print the field numbering of a page's form
    Order {
        /// Page fixture (JSON)
        #[arg(short, long)]
        page: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the content hash of a value (SHA-1 of the trimmed, lowercased value)
    Hash {
        value: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), FormsenseCliError> {
    match command {
        Commands::Replay {
            page,
            script,
            config,
            pixel_id,
            api_host,
            no_raw_data,
            dry_run,
            output,
        } => {
            let config = resolve_config(config.as_deref(), pixel_id, api_host, no_raw_data)?;
            cmd_replay(&page, &script, config, dry_run, &output)
        }

        Commands::Order { page, json } => cmd_order(&page, json),

        Commands::Hash { value } => {
            println!("{}", content_hash(&value));
            Ok(())
        }
    }
}

fn resolve_config(
    path: Option<&Path>,
    pixel_id: Option<String>,
    api_host: Option<String>,
    no_raw_data: bool,
) -> Result<TrackerConfig, FormsenseCliError> {
    let mut config = match path {
        Some(path) => TrackerConfig::from_json(&fs::read_to_string(path)?)?,
        None => TrackerConfig::new("", ""),
    };

    if let Some(pixel_id) = pixel_id {
        config.pixel_id = pixel_id;
    }
    if let Some(api_host) = api_host {
        config.api_host = api_host;
    }
    config.no_raw_data |= no_raw_data;

    config.validate()?;
    Ok(config)
}

fn read_input(path: &Path) -> Result<String, FormsenseCliError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(FormsenseCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_replay(
    page: &Path,
    script: &Path,
    config: TrackerConfig,
    dry_run: bool,
    output: &Path,
) -> Result<(), FormsenseCliError> {
    let fixture = PageFixture::from_json(&fs::read_to_string(page)?)?;
    let steps = parse_script(&read_input(script)?)?;
    if steps.is_empty() {
        return Err(FormsenseCliError::NoSteps);
    }

    let start = steps
        .iter()
        .find_map(|s| s.at)
        .unwrap_or_else(|| SystemClock.now_ms());

    let offline = Rc::new(OfflineTransport::new());
    let transport: Box<dyn Transport> = if dry_run {
        Box::new(Rc::clone(&offline))
    } else {
        Box::new(HttpTransport::new(&config)?)
    };

    let mut replay = Replay::new(config, &fixture, transport, start)?;
    let mut deliveries = replay.run(&steps)?;
    // anything a history push left behind
    deliveries.extend(replay.tracker_mut().pump());

    let lines: Vec<String> = if dry_run {
        offline
            .requests()
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?
    } else {
        deliveries.iter().map(|d: &Delivery| d.to_json().to_string()).collect()
    };

    let mut output_data = lines.join("\n");
    if !output_data.is_empty() {
        output_data.push('\n');
    }

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(output_data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    let failed = deliveries.iter().filter(|d| !d.is_ok()).count();
    if failed > 0 {
        log::warn!("{} of {} sends failed", failed, deliveries.len());
    }
    Ok(())
}

fn cmd_order(page: &Path, json: bool) -> Result<(), FormsenseCliError> {
    let fixture = PageFixture::from_json(&fs::read_to_string(page)?)?;
    let controls = &fixture.form.controls;

    let rows: Vec<OrderRow> = number_controls(controls)
        .into_iter()
        .map(|n| {
            let control = &controls[n.id.0];
            OrderRow {
                field_number: n.field_number,
                dom_index: n.id.0,
                order_key: n.order,
                tab_index: control.tab_index,
                control_type: control.kind(),
                name: control.name.clone(),
            }
        })
        .collect();

    if json {
        let report = OrderReport {
            producer: PRODUCER_NAME.to_string(),
            version: FORMSENSE_VERSION.to_string(),
            fields: rows,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Field Order");
        println!("===========");
        for row in &rows {
            println!(
                "  {:>3}. [{}] {} (dom {}, tabindex {}, key {})",
                row.field_number,
                row.control_type,
                if row.name.is_empty() { "-" } else { row.name.as_str() },
                row.dom_index,
                row.tab_index,
                row.order_key
            );
        }
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum FormsenseCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    NoSteps,
    InteractiveStdin,
}

impl From<io::Error> for FormsenseCliError {
    fn from(e: io::Error) -> Self {
        FormsenseCliError::Io(e)
    }
}

impl From<TrackerError> for FormsenseCliError {
    fn from(e: TrackerError) -> Self {
        FormsenseCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for FormsenseCliError {
    fn from(e: serde_json::Error) -> Self {
        FormsenseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FormsenseCliError> for CliError {
    fn from(e: FormsenseCliError) -> Self {
        match e {
            FormsenseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FormsenseCliError::Tracker(TrackerError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Pass --pixel-id and --api-host or a --config file".to_string()),
            },
            FormsenseCliError::Tracker(TrackerError::ScriptError(msg)) => CliError {
                code: "SCRIPT_ERROR".to_string(),
                message: msg,
                hint: Some("Each script line must be one JSON step with a \"kind\"".to_string()),
            },
            FormsenseCliError::Tracker(e) => CliError {
                code: "TRACKER_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the page fixture matches the script".to_string()),
            },
            FormsenseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FormsenseCliError::NoSteps => CliError {
                code: "NO_STEPS".to_string(),
                message: "No steps found in script".to_string(),
                hint: Some("Ensure the script file is not empty".to_string()),
            },
            FormsenseCliError::InteractiveStdin => CliError {
                code: "INTERACTIVE_STDIN".to_string(),
                message: "Refusing to read a script from a terminal".to_string(),
                hint: Some("Pipe the script in or pass --script <file>".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct OrderReport {
    producer: String,
    version: String,
    fields: Vec<OrderRow>,
}

#[derive(serde::Serialize)]
struct OrderRow {
    field_number: usize,
    dom_index: usize,
    order_key: i64,
    tab_index: i32,
    control_type: String,
    name: String,
}
