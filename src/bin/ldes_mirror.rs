use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipdc_ldes_mirror::archive::Archive;
use ipdc_ldes_mirror::config::{ConfigLoader, ResolvedConfig, archive_dir};
use ipdc_ldes_mirror::domain::OriginPage;
use ipdc_ldes_mirror::error::{ErrorKind, MirrorError};
use ipdc_ldes_mirror::feed::FeedHttpClient;
use ipdc_ldes_mirror::importer::{Importer, RunReport};
use ipdc_ldes_mirror::output::{ClearReport, JsonOutput, StatusReport, TriggerReply};
use ipdc_ldes_mirror::rdf::{HttpContextLoader, JsonLdConverter};

type HttpImporter = Importer<FeedHttpClient, JsonLdConverter<HttpContextLoader>>;

#[derive(Parser)]
#[command(name = "ldes-mirror")]
#[command(about = "Mirror the IPDC product snapshot feed into a relocatable archive of page files")]
#[command(version, author)]
struct Cli {
    /// JSON config file; environment variables override its values.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import, poll on schedule and accept triggers on stdin (default)")]
    Serve,
    #[command(about = "Run one import and print its report")]
    Import,
    #[command(about = "Show the archive directory, resume page and page files")]
    Status,
    #[command(about = "Delete every page file from the archive")]
    Clear,
}

/// Commands accepted on stdin while serving.
#[derive(Debug, PartialEq, Eq)]
enum ServeCommand {
    Import,
    Status,
    Quit,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MirrorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MirrorError) -> u8 {
    match error.kind() {
        ErrorKind::Conflict => 4,
        ErrorKind::Fetch => 3,
        ErrorKind::Config => 2,
        ErrorKind::Conversion | ErrorKind::Storage => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(ConfigLoader::resolve(config_path)?),
        Commands::Import => {
            let importer = build_importer(&ConfigLoader::resolve(config_path)?)?;
            let report = importer.trigger()?;
            JsonOutput::print_report(&report).into_diagnostic()
        }
        Commands::Status => {
            let archive = Archive::new(archive_dir(&ConfigLoader::load(config_path)?)?);
            let cursor = archive.resolve_cursor()?;
            JsonOutput::print_status(&status(&archive, cursor, false)?).into_diagnostic()
        }
        Commands::Clear => {
            let archive = Archive::new(archive_dir(&ConfigLoader::load(config_path)?)?);
            let removed = archive.clear()?;
            info!(archive = %archive.root(), removed, "archive cleared");
            JsonOutput::print_clear(&ClearReport {
                archive_dir: archive.root().to_string(),
                removed,
            })
            .into_diagnostic()
        }
    }
}

fn build_importer(config: &ResolvedConfig) -> Result<HttpImporter, MirrorError> {
    let feed = FeedHttpClient::new(
        config.api_host.clone(),
        &config.api_key,
        config.request_timeout,
    )?;
    let converter = JsonLdConverter::new(HttpContextLoader::new(config.request_timeout)?);
    Importer::resume(feed, converter, Archive::new(config.archive_dir.clone()))
}

/// `cursor` is the live cursor while serving, the archive-derived one otherwise.
fn status(archive: &Archive, cursor: OriginPage, busy: bool) -> Result<StatusReport, MirrorError> {
    Ok(StatusReport {
        archive_dir: archive.root().to_string(),
        cursor,
        busy,
        pages: archive.list_pages()?,
    })
}

fn serve(config: ResolvedConfig) -> miette::Result<()> {
    let importer = Arc::new(build_importer(&config)?);
    let mut runs: Vec<JoinHandle<Result<RunReport, MirrorError>>> = Vec::new();

    info!("running initial import");
    runs.push(importer.spawn_run()?);

    let scheduler = if config.polling_enabled {
        info!(pattern = %config.cron_pattern, "polling enabled");
        Some(config.scheduler.clone().spawn(Arc::clone(&importer)))
    } else {
        None
    };

    let mut quit = false;
    for line in io::stdin().lock().lines() {
        let line = line.into_diagnostic()?;
        let command = match parse_serve_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(report) => {
                warn!("{report}");
                continue;
            }
        };
        match command {
            ServeCommand::Import => {
                let reply = match importer.spawn_run() {
                    Ok(handle) => {
                        runs.push(handle);
                        TriggerReply {
                            accepted: true,
                            reason: None,
                        }
                    }
                    Err(MirrorError::ImportInProgress) => TriggerReply {
                        accepted: false,
                        reason: Some(MirrorError::ImportInProgress.to_string()),
                    },
                    Err(err) => return Err(err.into()),
                };
                JsonOutput::print_reply(&reply).into_diagnostic()?;
            }
            ServeCommand::Status => {
                let state = importer.state();
                let report = status(importer.archive(), state.cursor(), state.is_busy())?;
                JsonOutput::print_status(&report).into_diagnostic()?;
            }
            ServeCommand::Quit => {
                quit = true;
                break;
            }
        }
        runs.retain(|handle| !handle.is_finished());
    }

    match scheduler {
        Some(handle) if quit => handle.stop(),
        Some(handle) => {
            info!("stdin closed; continuing on schedule");
            handle.wait();
        }
        None => {}
    }
    for handle in runs {
        // failures are logged by the importer
        let _ = handle.join();
    }
    Ok(())
}

fn parse_serve_command(input: &str) -> miette::Result<Option<ServeCommand>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "import" | "trigger" => Ok(Some(ServeCommand::Import)),
        "status" => Ok(Some(ServeCommand::Status)),
        "quit" | "exit" => Ok(Some(ServeCommand::Quit)),
        other => Err(miette::Report::msg(format!(
            "unknown command: {other} (expected import, status or quit)"
        ))),
    }
}
