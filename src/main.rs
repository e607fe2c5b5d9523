//! devicefarm-cli - Interact with AWS Device Farm from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use devicefarm::config::{self, Config};
use devicefarm::farm::aws::AwsDeviceFarm;
use devicefarm::farm::{ArtifactCategory, DeviceFarm, UploadKind};
use devicefarm::pool::{DeviceKey, create_pool_from_device};
use devicefarm::progress::{ConsoleReporter, Reporter};
use devicefarm::report::ReportBuilder;
use devicefarm::scheduler::{RunScheduler, ScheduleRequest, Source};
use devicefarm::table::Table;
use devicefarm::transfer::{HttpTransfer, Transfer};
use devicefarm::upload::Uploader;

#[derive(Parser)]
#[command(name = "devicefarm-cli")]
#[command(about = "Interact with AWS Device Farm from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path [default: devicefarm.toml, if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AWS region of the device farm
    #[arg(long, env = "DF_REGION", global = true)]
    region: Option<String>,

    /// Directory reports and downloads are written to
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    /// Verbose output (debug logs; overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List various elements on the device farm
    #[command(subcommand)]
    List(ListCommand),

    /// Create device farm elements
    #[command(subcommand)]
    Create(CreateCommand),

    /// Upload an app, test package, test spec or data
    #[command(subcommand)]
    Upload(UploadCommand),

    /// Download device farm elements
    #[command(subcommand)]
    Download(DownloadCommand),

    /// Schedule a run, wait for it and download its report
    Schedule(ScheduleArgs),

    /// Print the status of a run
    Status {
        #[command(flatten)]
        run: RunArg,
    },

    /// Download the per-suite artifact report of a run
    Report {
        #[command(flatten)]
        run: RunArg,
    },

    /// Print detailed info about a device farm element
    #[command(subcommand)]
    Info(InfoCommand),
}

#[derive(Subcommand)]
enum ListCommand {
    /// List the projects of the account
    Projects,
    /// List every device the farm offers
    Devices,
    /// List the device pools of a project
    Devicepools {
        #[command(flatten)]
        project: ProjectArg,
    },
    /// List the uploads of a project
    Uploads {
        #[command(flatten)]
        project: ProjectArg,
    },
    /// List the runs of a project
    Runs {
        #[command(flatten)]
        project: ProjectArg,
    },
    /// List the jobs of a run
    Jobs {
        #[command(flatten)]
        run: RunArg,
    },
    /// List the suites of a run or job
    Suites {
        #[command(flatten)]
        owner: RunOrJob,
    },
    /// List the tests of a run, job or suite
    Tests {
        #[command(flatten)]
        owner: RunOrJob,

        /// Suite ARN, used when neither run nor job is given
        #[arg(long, env = "DF_SUITE")]
        suite: Option<String>,
    },
    /// List the unique problems of a run
    Problems {
        #[command(flatten)]
        run: RunArg,
    },
    /// List the artifacts of a run or job
    Artifacts {
        #[command(flatten)]
        owner: RunOrJob,

        #[command(flatten)]
        category: CategoryArg,
    },
}

#[derive(Subcommand)]
enum CreateCommand {
    /// Create a private device pool holding one device
    Devicepool {
        #[command(flatten)]
        project: ProjectArg,

        /// Device as "<name> - <os>" or device ARN
        #[arg(long, env = "DF_DEVICE")]
        device: String,

        /// Pool name [default: the device]
        #[arg(long)]
        name: Option<String>,
    },
    /// Create an upload without sending a file and print its presigned URL
    Upload {
        #[command(flatten)]
        project: ProjectArg,

        /// Name of the upload
        #[arg(long)]
        name: String,

        /// Upload type, e.g. ANDROID_APP or INSTRUMENTATION_TEST_PACKAGE
        #[arg(long = "type", value_parser = parse_upload_kind)]
        kind: UploadKind,
    },
}

#[derive(Subcommand)]
enum UploadCommand {
    /// Upload a file and wait until it is processed
    File {
        #[command(flatten)]
        project: ProjectArg,

        /// Path to the file to upload
        #[arg(long)]
        file: PathBuf,

        /// Upload type, e.g. ANDROID_APP or INSTRUMENTATION_TEST_PACKAGE
        #[arg(long = "type", value_parser = parse_upload_kind)]
        kind: UploadKind,

        /// Name of the upload [default: the file name]
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum DownloadCommand {
    /// Download all artifacts of a run or job into one directory
    Artifacts {
        #[command(flatten)]
        owner: RunOrJob,

        #[command(flatten)]
        category: CategoryArg,
    },
}

#[derive(Subcommand)]
enum InfoCommand {
    /// Info about a run
    Run {
        #[command(flatten)]
        run: RunArg,
    },
    /// Info about an upload
    Upload {
        /// Upload ARN
        #[arg(long, env = "DF_UPLOAD")]
        upload: String,
    },
    /// Info about a job
    Job {
        /// Job ARN
        #[arg(long, env = "DF_JOB")]
        job: String,
    },
    /// Info about a suite
    Suite {
        /// Suite ARN
        #[arg(long, env = "DF_SUITE")]
        suite: String,
    },
}

#[derive(Args)]
struct ProjectArg {
    /// Project ARN
    #[arg(long, env = "DF_PROJECT")]
    project: String,
}

#[derive(Args)]
struct RunArg {
    /// Run ARN
    #[arg(long, env = "DF_RUN")]
    run: String,
}

#[derive(Args)]
struct RunOrJob {
    /// Run ARN, takes precedence over --job
    #[arg(long, env = "DF_RUN")]
    run: Option<String>,

    /// Job ARN
    #[arg(long, env = "DF_JOB")]
    job: Option<String>,
}

impl RunOrJob {
    fn arn(&self) -> Option<&str> {
        [&self.run, &self.job]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|arn| !arn.is_empty())
    }

    fn require(&self) -> Result<&str> {
        match self.arn() {
            Some(arn) => Ok(arn),
            None => bail!("Either --run or --job is required"),
        }
    }
}

#[derive(Args)]
struct CategoryArg {
    /// Only this artifact type [LOG, SCREENSHOT, FILE]
    #[arg(long = "type", env = "DF_ARTIFACT_TYPE", value_parser = parse_category)]
    category: Option<ArtifactCategory>,
}

#[derive(Args)]
struct ScheduleArgs {
    #[command(flatten)]
    project: ProjectArg,

    /// Name to give to the run
    #[arg(long, env = "DF_RUN_NAME")]
    name: String,

    /// Device pool ARN
    #[arg(long, env = "DF_DEVICE_POOL")]
    device_pool: Option<String>,

    /// Device to create a pool from, as "<name> - <os>" or device ARN
    #[arg(long, env = "DF_DEVICE")]
    device: Option<String>,

    /// ARN of an existing app upload
    #[arg(long, env = "DF_APP")]
    app: Option<String>,

    /// App file to upload
    #[arg(long, env = "DF_APP_FILE")]
    app_file: Option<PathBuf>,

    /// App upload type [default: guessed from the file extension]
    #[arg(long, env = "DF_APP_TYPE", value_parser = parse_upload_kind)]
    app_type: Option<UploadKind>,

    /// Test type, e.g. INSTRUMENTATION, APPIUM_PYTHON or BUILTIN_FUZZ
    #[arg(long, env = "DF_TEST_TYPE")]
    test_type: String,

    /// ARN of an existing test package upload
    #[arg(long, env = "DF_TEST")]
    test_package: Option<String>,

    /// Test package file to upload
    #[arg(long, env = "DF_TEST_FILE")]
    test_file: Option<PathBuf>,

    /// ARN of an existing test spec upload
    #[arg(long, env = "DF_TEST_SPEC")]
    test_spec: Option<String>,

    /// Test spec file to upload
    #[arg(long, env = "DF_TEST_SPEC_FILE")]
    test_spec_file: Option<PathBuf>,
}

fn parse_upload_kind(value: &str) -> Result<UploadKind, String> {
    if value.trim().is_empty() {
        return Err("upload type must not be empty".to_string());
    }
    Ok(UploadKind::from(value.trim().to_ascii_uppercase().as_str()))
}

fn parse_category(value: &str) -> Result<ArtifactCategory, String> {
    match ArtifactCategory::from(value.to_ascii_uppercase().as_str()) {
        ArtifactCategory::Other(other) => Err(format!(
            "unknown artifact type '{}', expected LOG, SCREENSHOT or FILE",
            other
        )),
        category => Ok(category),
    }
}

/// Shared handles for one invocation.
struct App {
    config: Config,
    farm: Arc<dyn DeviceFarm>,
    transfer: Arc<dyn Transfer>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl App {
    fn uploader(&self) -> Uploader {
        Uploader::new(
            self.farm.clone(),
            self.transfer.clone(),
            self.config.polling.upload_policy(),
        )
        .with_cancellation_token(self.cancel.clone())
        .with_reporter(self.reporter.clone())
    }

    fn report_builder(&self) -> ReportBuilder {
        ReportBuilder::new(
            self.farm.clone(),
            self.transfer.clone(),
            self.config.report.options(),
        )
        .with_reporter(self.reporter.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging: -v, then RUST_LOG, then info
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    if let Some(region) = cli.region.filter(|r| !r.is_empty()) {
        config.farm.region = region;
    }
    if let Some(dir) = cli.report_dir {
        config.report.output_dir = dir;
    }
    debug!("Using region {}", config.farm.region);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let app = App {
        farm: Arc::new(AwsDeviceFarm::connect(&config.farm.region).await),
        transfer: Arc::new(HttpTransfer::new().context("Failed to set up HTTP client")?),
        reporter: Arc::new(ConsoleReporter::new(cli.verbose)),
        config,
        cancel,
    };

    match cli.command {
        Commands::List(command) => list(&app, command).await,
        Commands::Create(command) => create(&app, command).await,
        Commands::Upload(UploadCommand::File {
            project,
            file,
            kind,
            name,
        }) => {
            let upload = app
                .uploader()
                .upload(&file, kind, &project.project, name.as_deref())
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            println!("{}", upload.arn);
            Ok(())
        }
        Commands::Download(DownloadCommand::Artifacts { owner, category }) => {
            let arn = owner.require()?;
            app.report_builder()
                .download_flat(arn, category.category.as_ref())
                .await
                .context("Failed to download artifacts")?;
            Ok(())
        }
        Commands::Schedule(args) => schedule(&app, args).await,
        Commands::Status { run } => {
            let run = app.farm.get_run(&run.run).await.context("Failed to get run")?;
            println!("{}", run.status);
            Ok(())
        }
        Commands::Report { run } => {
            app.report_builder()
                .build(&run.run)
                .await
                .context("Failed to build report")?;
            Ok(())
        }
        Commands::Info(command) => info(&app, command).await,
    }
}

fn timestamp(value: Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

async fn list(app: &App, command: ListCommand) -> Result<()> {
    let farm = app.farm.as_ref();
    let table = match command {
        ListCommand::Projects => {
            let mut table = Table::new(["NAME", "CREATED", "ARN"]);
            for p in farm.list_projects().await? {
                table.row([p.name, timestamp(p.created), p.arn]);
            }
            table
        }
        ListCommand::Devices => {
            let mut devices = farm.list_devices().await?;
            devices.sort_by_key(|d| DeviceKey::of(d).to_string());
            let mut table =
                Table::new(["DEVICE", "PLATFORM", "FORM FACTOR", "MANUFACTURER", "ARN"]);
            for d in devices {
                table.row([
                    DeviceKey::of(&d).to_string(),
                    d.platform,
                    d.form_factor,
                    d.manufacturer,
                    d.arn,
                ]);
            }
            table
        }
        ListCommand::Devicepools { project } => {
            let mut table = Table::new(["NAME", "TYPE", "DESCRIPTION", "ARN"]);
            for p in farm.list_device_pools(&project.project).await? {
                table.row([
                    p.name,
                    p.pool_type.to_string(),
                    p.description.unwrap_or_default(),
                    p.arn,
                ]);
            }
            table
        }
        ListCommand::Uploads { project } => {
            let mut table = Table::new(["NAME", "TYPE", "STATUS", "ARN"]);
            for u in farm.list_uploads(&project.project).await? {
                table.row([u.name, u.kind.to_string(), u.status.to_string(), u.arn]);
            }
            table
        }
        ListCommand::Runs { project } => {
            let mut table = Table::new(["NAME", "TEST TYPE", "STATUS", "RESULT", "CREATED", "ARN"]);
            for r in farm.list_runs(&project.project).await? {
                table.row([
                    r.name,
                    r.test_type,
                    r.status.to_string(),
                    r.result.to_string(),
                    timestamp(r.created),
                    r.arn,
                ]);
            }
            table
        }
        ListCommand::Jobs { run } => {
            let mut table = Table::new(["JOB", "STATUS", "RESULT", "ARN"]);
            for j in farm.list_jobs(&run.run).await? {
                table.row([
                    j.display_name(),
                    j.status.to_string(),
                    j.result.to_string(),
                    j.arn,
                ]);
            }
            table
        }
        ListCommand::Suites { owner } => {
            let mut table = Table::new(["NAME", "STATUS", "RESULT", "MESSAGE", "ARN"]);
            for s in farm.list_suites(owner.require()?).await? {
                table.row([
                    s.name,
                    s.status.to_string(),
                    s.result.to_string(),
                    s.message.unwrap_or_default(),
                    s.arn,
                ]);
            }
            table
        }
        ListCommand::Tests { owner, suite } => {
            let arn = match (owner.arn(), suite.as_deref().filter(|s| !s.is_empty())) {
                (Some(arn), _) => arn,
                (None, Some(suite)) => suite,
                (None, None) => bail!("One of --run, --job or --suite is required"),
            };
            let mut table = Table::new(["NAME", "STATUS", "RESULT", "MESSAGE", "ARN"]);
            for t in farm.list_tests(arn).await? {
                table.row([
                    t.name,
                    t.status.to_string(),
                    t.result.to_string(),
                    t.message.unwrap_or_default(),
                    t.arn,
                ]);
            }
            table
        }
        ListCommand::Problems { run } => {
            let mut table = Table::new(["RESULT", "COUNT", "MESSAGE"]);
            for p in farm.list_unique_problems(&run.run).await? {
                table.row([p.result.to_string(), p.occurrences.to_string(), p.message]);
            }
            table
        }
        ListCommand::Artifacts { owner, category } => {
            let arn = owner.require()?;
            let categories = match category.category {
                Some(category) => vec![category],
                None => ArtifactCategory::ALL.to_vec(),
            };
            let mut table = Table::new(["CATEGORY", "TYPE", "FILE", "ARN"]);
            for category in categories {
                for a in farm.list_artifacts(arn, &category).await? {
                    table.row([a.category.to_string(), a.kind.clone(), a.file_name(), a.arn]);
                }
            }
            table
        }
    };

    if table.is_empty() {
        eprintln!("Nothing found");
    } else {
        print!("{}", table);
    }
    Ok(())
}

async fn create(app: &App, command: CreateCommand) -> Result<()> {
    match command {
        CreateCommand::Devicepool {
            project,
            device,
            name,
        } => {
            let pool = create_pool_from_device(
                app.farm.as_ref(),
                &project.project,
                &device,
                name.as_deref(),
            )
            .await
            .context("Failed to create device pool")?;
            println!("{}", pool.arn);
        }
        CreateCommand::Upload {
            project,
            name,
            kind,
        } => {
            let upload = app
                .uploader()
                .create(&project.project, &name, kind)
                .await
                .context("Failed to create upload")?;
            println!("{}", serde_json::to_string_pretty(&upload)?);
        }
    }
    Ok(())
}

async fn schedule(app: &App, args: ScheduleArgs) -> Result<()> {
    let request = ScheduleRequest {
        project_arn: args.project.project,
        run_name: args.name,
        app: Source::from_parts(args.app, args.app_file),
        app_kind: args.app_type,
        device: args.device,
        device_pool: args.device_pool,
        test_type: args.test_type,
        test_package: Source::from_parts(args.test_package, args.test_file),
        test_spec: Source::from_parts(args.test_spec, args.test_spec_file),
    };

    let scheduler = RunScheduler::new(
        app.farm.clone(),
        app.uploader(),
        app.report_builder(),
        app.config.polling.run_policy(),
    )
    .with_cancellation_token(app.cancel.clone())
    .with_reporter(app.reporter.clone());

    let outcome = scheduler
        .schedule(&request)
        .await
        .context("Failed to schedule run")?;

    println!(
        "Run {} finished with result {}",
        outcome.run.name,
        console::style(&outcome.run.result).bold()
    );
    println!("{}", outcome.run.arn);
    Ok(())
}

async fn info(app: &App, command: InfoCommand) -> Result<()> {
    let farm = app.farm.as_ref();
    let json = match command {
        InfoCommand::Run { run } => serde_json::to_string_pretty(&farm.get_run(&run.run).await?)?,
        InfoCommand::Upload { upload } => {
            serde_json::to_string_pretty(&farm.get_upload(&upload).await?)?
        }
        InfoCommand::Job { job } => serde_json::to_string_pretty(&farm.get_job(&job).await?)?,
        InfoCommand::Suite { suite } => {
            serde_json::to_string_pretty(&farm.get_suite(&suite).await?)?
        }
    };
    println!("{}", json);
    Ok(())
}
