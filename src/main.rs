use clap::{Arg, ArgMatches, Command};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sysmend::classifier::{order_for_display, summarize};
use sysmend::core::errors::log_error;
use sysmend::core::{
    CancelToken, Config, OsFileSystem, SysmendError, SysmendResult, SystemCommandRunner,
    TracingSink,
};
use sysmend::engine::{Engine, RemediationOutcome};
use sysmend::fixers::{AutoApprove, Confirm, StdinPrompt};
use sysmend::scanners::health::HealthStatus;
use sysmend::scanners::manager::ScanSession;
use sysmend::scanners::progress::ProgressEvent;
use sysmend::scanners::validator::ValidationStatus;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() {
    let matches = build_cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", verbose);
            log_error(&e);
            eprintln!("Error: {}", e.chain());
            std::process::exit(2);
        }
    };

    init_logging(&config.app.log_level, verbose);
    info!("sysmend {} starting", config.app.version);

    let code = match run(&matches, config) {
        Ok(code) => code,
        Err(e) => {
            log_error(&e);
            eprintln!("Error: {}", e.chain());
            if e.is_fatal() {
                2
            } else {
                1
            }
        }
    };

    std::process::exit(code);
}

fn build_cli() -> Command {
    Command::new("sysmend")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Linux host diagnostic scanner with safe auto-remediation")
        .long_about(
            "sysmend scans a Linux host for service, configuration, permission, log, \
             security and resource problems, and fixes the safe ones after confirmation.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Specifies a custom config file")
                .global(true)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .subcommand(
            Command::new("scan")
                .about("Run every probe and list the issues found")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the scan session as JSON"),
                ),
        )
        .subcommand(
            Command::new("fix")
                .about("Scan, then fix the safe issues after confirmation")
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Apply fixes without asking"),
                ),
        )
        .subcommand(
            Command::new("health")
                .about("Quick health check of load, memory, disk, services and network"),
        )
        .subcommand(
            Command::new("validate").about("Validate nginx, sshd and postfix configuration"),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

/// An explicit `--config` must load; the default path is optional
fn load_config(matches: &ArgMatches) -> SysmendResult<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::load_from_file(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load_from_file(DEFAULT_CONFIG_PATH)
        }
        None => Ok(Config::default_config()),
    }
}

fn init_logging(log_level: &str, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        log_level.parse::<Level>().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Logging could not be initialized: {}", e);
    }
}

fn run(matches: &ArgMatches, config: Config) -> SysmendResult<i32> {
    match matches.subcommand() {
        Some(("config", _)) => {
            config.validate()?;
            print!("{}", config.to_yaml()?);
            Ok(0)
        }
        Some(("scan", sub_matches)) => handle_scan_command(sub_matches, build_engine(config)?),
        Some(("fix", sub_matches)) => handle_fix_command(sub_matches, build_engine(config)?),
        Some(("health", _)) => Ok(handle_health_command(&build_engine(config)?)),
        Some(("validate", _)) => Ok(handle_validate_command(&build_engine(config)?)),
        _ => {
            info!("Run 'sysmend --help' for available commands");
            Ok(0)
        }
    }
}

fn build_engine(config: Config) -> SysmendResult<Engine> {
    let runner = SystemCommandRunner::new()
        .map_err(|e| SysmendError::io(format!("Command runtime could not be started: {}", e)))?;

    Engine::new(
        config,
        Arc::new(runner),
        Arc::new(OsFileSystem),
        Arc::new(TracingSink),
    )
}

/// Cancel `token` on Ctrl-C; a second Ctrl-C exits immediately
fn install_interrupt_handler(token: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Interrupt handler unavailable: {}", e);
                return;
            }
        };

        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupted, stopping after the current step");
            token.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    });
}

fn print_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::ProbeStarted {
            title, index, total, ..
        } => eprintln!("[{}/{}] {}...", index + 1, total, title),
        ProgressEvent::ProbeStep { detail, .. } => eprintln!("      {}", detail),
        ProgressEvent::ProbeFinished {
            key,
            issues,
            failed,
            overall,
        } => {
            let status = if failed { "failed" } else { "done" };
            eprintln!(
                "      {} {} ({} issues, {:.0}% complete)",
                key,
                status,
                issues,
                overall * 100.0
            );
        }
        ProgressEvent::ScanFinished { interrupted: true, .. } => eprintln!("Scan interrupted"),
        ProgressEvent::ScanFinished { .. } => {}
    }
}

fn print_session(session: &ScanSession) {
    let summary = summarize(session.issues());

    println!("Scan Result");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Session: {}", session.id());
    println!("Started: {}", session.started_at());
    println!("Total issues: {}", summary.total());
    println!("  Critical: {}", summary.critical);
    println!("  Warning:  {}", summary.warning);
    println!("  Info:     {}", summary.info);

    for outcome in session.outcomes() {
        if let Some(failure) = &outcome.failure {
            println!("Probe {} failed: {}", outcome.key, failure);
        }
    }

    if session.is_empty() {
        println!("\nNo issues found.");
        return;
    }

    println!();
    for issue in order_for_display(session.issues()) {
        println!(
            "[{}] {} @ {}: {}",
            issue.severity.as_str().to_uppercase(),
            issue.issue_type,
            issue.location,
            issue.message
        );
        if !issue.suggestion.is_empty() {
            println!("    -> {}", issue.suggestion);
        }
    }
}

fn handle_scan_command(matches: &ArgMatches, mut engine: Engine) -> SysmendResult<i32> {
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let session = engine.scan(&print_progress, &cancel)?;
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(session)?);
    } else {
        print_session(session);
    }

    let interrupted = session.interrupted();
    engine.finish()?;

    Ok(if interrupted { 130 } else { 0 })
}

fn handle_fix_command(matches: &ArgMatches, mut engine: Engine) -> SysmendResult<i32> {
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let session = engine.scan(&print_progress, &cancel)?;
    print_session(session);
    if session.interrupted() {
        println!("\nScan was interrupted; nothing will be fixed.");
        return Ok(130);
    }

    let confirm: &dyn Confirm = if matches.get_flag("yes") {
        &AutoApprove
    } else {
        &StdinPrompt
    };

    println!();
    match engine.remediate(confirm, &cancel)? {
        RemediationOutcome::NothingToFix => {
            println!("No automatically fixable issues.");
            Ok(0)
        }
        RemediationOutcome::Declined => {
            println!("Fix cancelled by user.");
            Ok(0)
        }
        RemediationOutcome::Completed(report) => {
            for result in &report.results {
                match &result.error {
                    None => println!("  OK   {}", result.action),
                    Some(error) => println!(
                        "  FAIL {} @ {}: {}",
                        result.issue.issue_type, result.issue.location, error
                    ),
                }
            }
            println!(
                "\nFixes applied: {}/{}{}",
                report.applied,
                report.attempted,
                if report.interrupted { " (interrupted)" } else { "" }
            );

            Ok(if report.interrupted {
                130
            } else if report.failed() > 0 {
                1
            } else {
                0
            })
        }
    }
}

fn handle_health_command(engine: &Engine) -> i32 {
    let report = engine.health_check();

    println!("Health Check");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for reading in &report.readings {
        println!(
            "[{}] {}: {}",
            reading.status.as_str().to_uppercase(),
            reading.check,
            reading.message
        );
    }

    let overall = report.overall();
    println!("\nOverall: {}", overall);

    match overall {
        HealthStatus::Ok | HealthStatus::Warning => 0,
        HealthStatus::Error | HealthStatus::Critical => 1,
    }
}

fn handle_validate_command(engine: &Engine) -> i32 {
    let results = engine.validate_configs();

    let mut invalid = 0;
    for result in &results {
        if matches!(result.status, ValidationStatus::Invalid(_)) {
            invalid += 1;
        }
        println!("{} ({}): {}", result.name, result.path.display(), result.status);
    }

    if invalid > 0 {
        1
    } else {
        0
    }
}
