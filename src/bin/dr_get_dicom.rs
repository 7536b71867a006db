use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dr_get_dicom::app::App;
use dr_get_dicom::catalog::IcommandsClient;
use dr_get_dicom::config::ConfigLoader;
use dr_get_dicom::domain::ScanDate;
use dr_get_dicom::error::DicomError;
use dr_get_dicom::output::{JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "dr-get-dicom")]
#[command(
    about = "Download one DICOM file per session acquired on a given date from the Donders Repository"
)]
#[command(version)]
struct Cli {
    /// Acquisition date in the form YYYYmmdd (default: today)
    #[arg(short = 't', long = "date")]
    date: Option<String>,

    /// Local path for storing the downloaded raw data
    #[arg(short = 'd', long = "dest")]
    dest: Option<String>,

    /// Print debug messages
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<String>,

    /// Number of concurrent workers per stage
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Print a JSON run summary on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DicomError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DicomError) -> u8 {
    match error {
        DicomError::InvalidDate(_)
        | DicomError::InvalidConfig(_)
        | DicomError::ConfigRead(_)
        | DicomError::ConfigParse(_) => 2,
        DicomError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let date = match cli.date.as_deref() {
        Some(value) => value.parse::<ScanDate>()?,
        None => ScanDate::today(),
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(dest) = cli.dest {
        config.dest_root = dest.into();
    }
    if let Some(workers) = cli.workers {
        if workers == 0 {
            return Err(DicomError::InvalidConfig("workers must be at least 1".to_string()).into());
        }
        config.workers = workers;
    }
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Log
    };

    let client = IcommandsClient::new()?;
    let app = App::new(client, config, date);
    let summary = app.run();
    tracing::debug!(artifacts = summary.artifact_count(), "run finished");

    if matches!(output_mode, OutputMode::Json) {
        JsonOutput::print_summary(&summary).into_diagnostic()?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
