use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use akg_builder::app::{App, ProgressSink};
use akg_builder::config::ConfigLoader;
use akg_builder::error::AkgError;
use akg_builder::output::{JsonOutput, OutputMode, TextOutput};
use akg_builder::store::{DEFAULT_LEDGER_FILE, Store};
use akg_builder::workbook::XlsxReader;

#[derive(Parser)]
#[command(name = "akg")]
#[command(
    about = "Turn supplementary expression tables from articles into gene knowledge-graph triples"
)]
#[command(version, author)]
struct Cli {
    /// Workspace directory holding the tracking file and downloads.
    #[arg(long, global = true, default_value = "data")]
    input_dir: String,

    /// Tracking file name, relative to the input directory.
    #[arg(long, global = true, default_value = DEFAULT_LEDGER_FILE)]
    tracking_file: String,

    #[arg(long, global = true)]
    config: Option<String>,

    /// Log file name, relative to the input directory.
    #[arg(long, global = true, default_value = "akg.log")]
    log: String,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Record newly downloaded files in the tracking file")]
    Scan,
    #[command(about = "Split workbooks into one CSV per sheet")]
    Split,
    #[command(about = "Keep split tables with a fold-change column")]
    Convert,
    #[command(about = "Normalize converted tables")]
    Clean,
    #[command(about = "Extract gene triples from cleaned tables")]
    Extract,
    #[command(about = "Check split tables for expression data")]
    Check(CheckArgs),
    #[command(about = "Exclude a tracked file by id, name or path")]
    Exclude(ExcludeArgs),
    #[command(about = "Write the tracking report")]
    Report,
    #[command(about = "Merge graph files into one sorted file")]
    Combine(CombineArgs),
    #[command(about = "Normalize literals in a graph file")]
    Tidy(TidyArgs),
    #[command(about = "Add gene symbols to an exported query result")]
    Annotate(AnnotateArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Exclude tables judged unsuitable.
    #[arg(long)]
    exclude: bool,
}

#[derive(Args)]
struct ExcludeArgs {
    target: String,

    #[arg(long)]
    reason: String,
}

#[derive(Args)]
struct CombineArgs {
    /// Combine every graph file of one source id.
    #[arg(long)]
    source_id: Option<String>,

    /// Graph files relative to the input directory.
    files: Vec<String>,

    /// Output name inside the graph directory.
    #[arg(long)]
    output: Option<String>,
}

#[derive(Args)]
struct TidyArgs {
    input: String,
    output: String,
}

#[derive(Args)]
struct AnnotateArgs {
    input: Utf8PathBuf,
    output: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<AkgError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AkgError) -> u8 {
    match error {
        AkgError::Configuration(_)
        | AkgError::ConfigRead(_)
        | AkgError::ConfigParse(_)
        | AkgError::MissingInputDir(_)
        | AkgError::LedgerMissing(_)
        | AkgError::EntryNotFound(_) => 2,
        AkgError::LedgerCorrupt { .. } | AkgError::LedgerWriteConflict(_) => 3,
        _ => 1,
    }
}

fn init_logging(input_dir: &Utf8Path, log: &str) {
    let log_file = if input_dir.as_std_path().is_dir() {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(input_dir.join(log).as_std_path())
            .ok()
    } else {
        None
    };
    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let input_dir = Utf8PathBuf::from(&cli.input_dir);
    init_logging(&input_dir, &cli.log);

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    if !input_dir.as_std_path().is_dir() {
        return Err(AkgError::MissingInputDir(input_dir.into_std_path_buf()).into());
    }
    let config = ConfigLoader::resolve(&input_dir, cli.config.as_deref())?;
    let store = Store::new(&cli.input_dir, &cli.tracking_file, &config)?;
    let app = App::new(store, config, XlsxReader);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &TextOutput,
    };

    match cli.command {
        Command::Scan => {
            let result = app.scan(sink)?;
            print(output_mode, &result, TextOutput::print_scan)
        }
        Command::Split => {
            let report = app.split(sink)?;
            print(output_mode, &report, TextOutput::print_stage)
        }
        Command::Convert => {
            let report = app.convert(sink)?;
            print(output_mode, &report, TextOutput::print_stage)
        }
        Command::Clean => {
            let report = app.clean(sink)?;
            print(output_mode, &report, TextOutput::print_stage)
        }
        Command::Extract => {
            let result = app.extract(sink)?;
            print(output_mode, &result, TextOutput::print_extract)
        }
        Command::Check(args) => {
            let report = app.check(args.exclude, sink)?;
            print(output_mode, &report, TextOutput::print_check)
        }
        Command::Exclude(args) => {
            let result = app.exclude(&args.target, &args.reason)?;
            print(output_mode, &result, TextOutput::print_exclude)
        }
        Command::Report => {
            let result = app.report()?;
            print(output_mode, &result, TextOutput::print_report)
        }
        Command::Combine(args) => {
            let result = app.combine(
                args.source_id.as_deref(),
                &args.files,
                args.output.as_deref(),
            )?;
            print(output_mode, &result, TextOutput::print_combine)
        }
        Command::Tidy(args) => {
            let result = app.tidy(&args.input, &args.output)?;
            print(output_mode, &result, TextOutput::print_tidy)
        }
        Command::Annotate(args) => {
            let result = app.annotate(&args.input, &args.output)?;
            print(output_mode, &result, TextOutput::print_annotate)
        }
    }
}

fn print<T: serde::Serialize>(
    mode: OutputMode,
    value: &T,
    text: fn(&T) -> std::io::Result<()>,
) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print_json(value).into_diagnostic(),
        OutputMode::Text => text(value).into_diagnostic(),
    }
}
