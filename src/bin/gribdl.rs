use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gribdl::app::{App, BatchReport, BatchRequest, ProgressSink};
use gribdl::config::{
    ConfigLoader, ConfigOverrides, DEFAULT_HEIGHT, DEFAULT_MAX_STEP, DEFAULT_OUTPUT, DEFAULT_PARAM,
    ResolvedConfig,
};
use gribdl::domain::{ParamList, Provider};
use gribdl::error::GribError;
use gribdl::http::HttpClient;
use gribdl::output::{JsonOutput, LogSink, OutputMode};
use gribdl::regrid::{CdoRegridder, NoRegrid, Regridder};
use gribdl::store::Store;

#[derive(Parser)]
#[command(name = "gribdl")]
#[command(about = "Download the latest forecast run from DWD or NOAA as GRIB2 files")]
#[command(version)]
struct Cli {
    /// Print the batch report as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download ICON fields from the DWD open data server")]
    Dwd(ModelArgs),
    #[command(about = "Download GFS fields from the NOAA open data bucket")]
    Noaa(ModelArgs),
}

#[derive(Args, Clone)]
struct ModelArgs {
    /// Model name, e.g. icon-eu or gfs.
    model: String,

    /// Comma-separated parameter list.
    #[arg(long, default_value = DEFAULT_PARAM)]
    param: String,

    /// Highest forecast step to fetch; clamped to what the run publishes.
    #[arg(
        long,
        alias = "maxStep",
        default_value_t = DEFAULT_MAX_STEP,
        allow_negative_numbers = true
    )]
    max_step: i64,

    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: String,

    /// Level label used to look up NOAA index entries.
    #[arg(long, default_value = DEFAULT_HEIGHT)]
    height: String,

    /// Keep DWD files on their native grid.
    #[arg(long)]
    no_regrid: bool,

    #[arg(long)]
    concurrency: Option<usize>,

    /// Retries per request after the first attempt.
    #[arg(long)]
    retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    weights_dir: Option<String>,

    #[arg(long)]
    staging_dir: Option<String>,
}

impl ModelArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            output_dir: Some(self.output.clone()),
            staging_dir: self.staging_dir.clone(),
            weights_dir: self.weights_dir.clone(),
            retries: self.retries,
            retry_delay_ms: None,
            concurrency: self.concurrency,
            timeout_secs: self.timeout,
            no_regrid: self.no_regrid,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GribError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GribError) -> u8 {
    if error.is_configuration() { 2 } else { 1 }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let (provider, args) = match cli.command {
        Commands::Dwd(args) => (Provider::Dwd, args),
        Commands::Noaa(args) => (Provider::Noaa, args),
    };
    let params: ParamList = args.param.parse()?;
    let config = ConfigLoader::resolve(provider, args.overrides())?;
    let request = BatchRequest {
        provider,
        model: args.model.clone(),
        params,
        max_step: args.max_step,
        height: args.height.clone(),
    };

    let report = match provider {
        Provider::Dwd => {
            let regridder = CdoRegridder::new(config.weights_dir.clone());
            execute(&config, regridder, &request, output_mode)?
        }
        Provider::Noaa => execute(&config, NoRegrid, &request, output_mode)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Human => print_summary(&report),
    }
    Ok(())
}

fn execute<R: Regridder>(
    config: &ResolvedConfig,
    regridder: R,
    request: &BatchRequest,
    output_mode: OutputMode,
) -> Result<BatchReport, GribError> {
    let store = Store::new_with_paths(config.output_dir.clone(), config.staging_dir.clone());
    let source = HttpClient::new(config.timeout)?;
    let app = App::new(store, source, regridder, config.settings);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };
    app.run(request, Utc::now(), sink)
}

fn print_summary(report: &BatchReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}gribdl {} {} run {}{reset}",
        report.provider, report.model, report.run
    );
    println!(
        "{green}Landed: {}/{}{reset}",
        report.landed.len(),
        report.units
    );
    for path in &report.landed {
        println!("{green}  {path}{reset}");
    }

    let color = if report.failures.is_empty() { yellow } else { red };
    println!("{color}Failed: {}{reset}", report.failures.len());
    for failure in &report.failures {
        println!("{red}  {failure}{reset}");
    }
}
