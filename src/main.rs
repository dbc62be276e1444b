#![forbid(unsafe_code)]

mod capture;
mod cli;
mod config;
mod constants;
mod injector;
mod kv;
mod mapper;
mod preset;
mod shell;
mod transfer;

use anyhow::{Context, Result, bail};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level as TraceLevel, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use capture::CaptureStore;
use cli::{Args, Command};
use config::Settings;
use constants::keys;
use injector::Injector;
use kv::MmkvFactory;
use preset::Preset;
use shell::{PrivilegedChannel, ShellChannel};
use transfer::{
    TransferController, TransferError, TransferOutcome, TransferTarget, TransferTicket, TransferWorker,
};

/// How often a long transfer is reported while waiting on it
const WAIT_POLL: Duration = Duration::from_secs(10);

fn parse_level(name: &str) -> TraceLevel {
    match name.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// Everything a subcommand needs
struct App {
    settings: Settings,
    channel: Arc<dyn PrivilegedChannel>,
    capture: Arc<CaptureStore>,
}

impl App {
    fn controller(&self) -> TransferController {
        TransferController::new(
            Arc::clone(&self.channel),
            Arc::new(MmkvFactory),
            TransferTarget::from_settings(&self.settings),
        )
    }

    fn injector(&self) -> Injector {
        Injector::new(Arc::clone(&self.capture), TransferWorker::spawn(self.controller()))
    }

    /// Load the capture from `local` or from the device
    fn load_capture(&self, local: Option<&Path>) -> bool {
        match local {
            Some(path) => self.capture.load_file(path),
            None => self
                .capture
                .load_via(self.channel.as_ref(), &self.settings.capture_file()),
        }
    }

    fn require_capture(&self, local: Option<&Path>, mode: Option<&str>) -> Result<()> {
        let events = self.capture.subscribe();
        let loaded = self.load_capture(local);
        if let Some(mode) = mode.filter(|_| loaded) {
            if !self.capture.set_active_mode(mode) {
                bail!(
                    "Unknown mode '{}'. Captured modes: {}",
                    mode,
                    self.capture.modes().join(", ")
                );
            }
        }
        for event in events.try_iter() {
            debug!(event = ?event, "Capture changed");
        }

        if !loaded {
            return Err(capture::unavailable_error());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&config_path)?;

    // LOG_LEVEL wins over the config file
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.log_level.clone());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&log_level))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %config_path.display(), package = %settings.camera_package, "Starting preset-inject");

    let app = App {
        channel: Arc::new(ShellChannel::new(&settings.su_binary)),
        capture: Arc::new(CaptureStore::new()),
        settings,
    };
    let local_capture = args.capture.as_deref();

    match args.command {
        Command::Filters { mode } => {
            app.require_capture(local_capture, mode.as_deref())?;
            print_filters(&app.capture);
        }
        Command::Resolve { text, mode } => {
            app.require_capture(local_capture, mode.as_deref())?;
            let index = app
                .capture
                .resolve(&text, None)
                .with_context(|| format!("No captured filter matches '{text}'"))?;
            let name = app.capture.find_by_index(index).map(|f| f.name).unwrap_or_default();
            println!("{index}\t{name}");
        }
        Command::Plan { preset, index } => {
            let preset = Preset::load(&preset)?;
            if index.is_none() || local_capture.is_some() {
                app.load_capture(local_capture);
            }
            let request = app.injector().plan(&preset, index)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&request).context("Failed to serialize write plan")?
            );
        }
        Command::Apply { preset, index } => {
            let preset = Preset::load(&preset)?;
            if index.is_none() || local_capture.is_some() {
                app.load_capture(local_capture);
            }
            let interrupted = trap_signals()?;
            let injector = app.injector();

            let (request, ticket) = injector.submit_apply(&preset, index)?;
            println!(
                "Writing {} keys for filter {} to {}",
                request.params.len(),
                request.filter_index,
                request.target_file
            );
            let result = wait_for_job(ticket, &interrupted);
            report_apply(result, &interrupted)?;
        }
        Command::Rollback => {
            let interrupted = trap_signals()?;
            let injector = app.injector();
            let ticket = injector.submit_rollback()?;
            match wait_for_job(ticket, &interrupted) {
                Ok(_) => println!("Store directory restored. Relaunch the camera."),
                Err(e) => {
                    error!(error = %e, "Rollback failed");
                    return Err(e.into());
                }
            }
            exit_if_interrupted(&interrupted);
        }
        Command::Inspect { store, all } => {
            let values = app.controller().inspect(store.into())?;
            for (key, value) in values {
                if !all && !key.starts_with(keys::EFFECT_PREFIX) {
                    continue;
                }
                match value {
                    Some(value) => println!("{key} = {value}"),
                    None => println!("{key} = <not an integer>"),
                }
            }
        }
    }

    Ok(())
}

fn print_filters(capture: &CaptureStore) {
    let state = capture.snapshot();
    let active = state.active_mode.clone().unwrap_or_default();
    if let Some(snapshot) = &state.snapshot {
        let captured = snapshot
            .captured_at()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{} captured {}", snapshot.camera_package, captured);
        for mode in snapshot.modes.keys() {
            let marker = if *mode == active { " (active)" } else { "" };
            println!("mode {mode}{marker}");
        }
    }
    for filter in state.filters(None) {
        println!("{:>3}\t{}\t{}", filter.index, filter.name, filter.lut_file);
    }
}

/// Trap SIGINT/SIGTERM so a transfer is never cut off between copy and restore
fn trap_signals() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&interrupted))
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(interrupted)
}

fn wait_for_job(
    ticket: TransferTicket,
    interrupted: &AtomicBool,
) -> Result<TransferOutcome, TransferError> {
    let mut warned = false;
    ticket.wait(WAIT_POLL, |phase| {
        println!("  {phase}");
        if interrupted.load(Ordering::SeqCst) && !warned {
            warn!("Interrupt received, exiting once the transfer finishes");
            warned = true;
        }
    })
}

fn report_apply(result: Result<TransferOutcome, TransferError>, interrupted: &AtomicBool) -> Result<()> {
    match result {
        Ok(TransferOutcome::Applied { keys_written, backup_taken, .. }) => {
            println!("Wrote {keys_written} keys. Relaunch the camera to pick them up.");
            if !backup_taken {
                println!("No backup was taken; rollback is not available for this write.");
            }
        }
        Ok(TransferOutcome::RolledBack) => {}
        Err(e) => {
            error!(error = %e, phase = ?e.phase(), "Apply failed");
            if e.may_have_modified_store() {
                eprintln!("The camera store may be partially written. Run `preset-inject rollback` to restore the backup.");
            } else if e.phase().is_some() {
                eprintln!("The camera store was not modified. Fix the cause above and retry.");
            }
            return Err(e.into());
        }
    }
    exit_if_interrupted(interrupted);
    Ok(())
}

fn exit_if_interrupted(interrupted: &AtomicBool) {
    if interrupted.load(Ordering::SeqCst) {
        warn!("Exiting after interrupt");
        std::process::exit(130);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_defaults_to_info() {
        assert_eq!(parse_level("DEBUG"), TraceLevel::DEBUG);
        assert_eq!(parse_level("warn"), TraceLevel::WARN);
        assert_eq!(parse_level("verbose"), TraceLevel::INFO);
    }
}
