//! `riderec` - CLI for riderecorder
//!
//! This binary runs the headless recording engine on the bike and lets
//! the rider inspect or export recorded sessions afterwards.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use riderecorder::cli::{
    Cli, Command, ConfigCommand, ExportCommand, OutputFormat, RecoverCommand, SessionsCommand,
    ShowCommand, StatusCommand,
};
use riderecorder::{export, init_logging, Config, Error, RecordKind, SessionRecord, SessionStore};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Record => handle_record(&config),
        Command::Sessions(cmd) => handle_sessions(&config, &cmd),
        Command::Show(cmd) => handle_show(&config, &cmd),
        Command::Export(cmd) => handle_export(&config, &cmd),
        Command::Recover(cmd) => handle_recover(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

/// Run the recording engine against the real hardware until terminated.
#[cfg(target_os = "linux")]
fn handle_record(config: &Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let ports = riderecorder_pi::engine_ports(config)?;
        riderecorder::engine::run(config, ports).await?;
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(not(target_os = "linux"))]
fn handle_record(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("recording needs the Raspberry Pi hardware adapters, which are Linux-only")
}

fn handle_sessions(config: &Config, cmd: &SessionsCommand) -> anyhow::Result<()> {
    let store = SessionStore::open(config.data_dir())?;
    let sessions = store.list_sessions()?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:<20} {:>8}  {}",
        "SESSION", "STARTED", "ENDED", "RECORDS", "SEALED"
    );
    for session in sessions {
        println!(
            "{:<20} {:<20} {:<20} {:>8}  {}",
            session.id,
            session.started_at.format("%Y-%m-%d %H:%M:%S"),
            session
                .ended_at
                .map_or_else(|| "-".to_string(), |t| t
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()),
            session.records,
            if session.sealed { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn handle_show(config: &Config, cmd: &ShowCommand) -> anyhow::Result<()> {
    let store = SessionStore::open(config.data_dir())?;
    let (summary, records) = store
        .read_session(&cmd.session)?
        .ok_or_else(|| Error::unknown_session(&cmd.session))?;

    let kind_filter = cmd.kind.map(RecordKind::from);
    let records: Vec<SessionRecord> = records
        .into_iter()
        .filter(|r| kind_filter.map_or(true, |kind| r.kind() == kind))
        .take(cmd.limit.unwrap_or(usize::MAX))
        .collect();

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        OutputFormat::Table => {
            println!(
                "Session {} ({} records{})",
                summary.id,
                records.len(),
                if summary.sealed { ", sealed" } else { ", open" }
            );
            println!("{:<28} {:<12} {}", "TIME", "KIND", "DETAIL");
            for record in &records {
                println!(
                    "{:<28} {:<12} {}",
                    record.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.kind().to_string(),
                    describe(record)
                );
            }
        }
    }
    Ok(())
}

/// One-line human summary of a record for table output.
fn describe(record: &SessionRecord) -> String {
    match record {
        SessionRecord::Fix(fix) => {
            let altitude = fix
                .altitude
                .map_or_else(String::new, |a| format!(" alt {a:.1}m"));
            let speed = fix
                .speed
                .map_or_else(String::new, |s| format!(" {s:.1}m/s"));
            format!(
                "{:.5},{:.5}{altitude}{speed} [{} sats {}]",
                fix.latitude, fix.longitude, fix.quality, fix.satellites
            )
        }
        SessionRecord::Environment(sample) => sample
            .values
            .iter()
            .map(|(quantity, value)| format!("{quantity} {value:.1}{}", quantity.unit()))
            .collect::<Vec<_>>()
            .join(", "),
        SessionRecord::Waypoint(waypoint) => format!(
            "{} @ {:.5},{:.5}",
            waypoint.label.as_deref().unwrap_or("(unlabeled)"),
            waypoint.fix.latitude,
            waypoint.fix.longitude
        ),
    }
}

fn handle_export(config: &Config, cmd: &ExportCommand) -> anyhow::Result<()> {
    let store = SessionStore::open(config.data_dir())?;
    let (summary, records) = store
        .read_session(&cmd.session)?
        .ok_or_else(|| Error::unknown_session(&cmd.session))?;

    if !summary.sealed {
        return Err(Error::SessionNotSealed {
            id: summary.id.clone(),
        }
        .into());
    }

    let output = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.gpx", summary.id)));

    let gpx = export::session_to_gpx(&summary, &records);
    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    export::write_gpx(&gpx, BufWriter::new(file))?;

    println!("Created GPX file at {}", output.display());
    Ok(())
}

fn handle_recover(config: &Config, cmd: &RecoverCommand) -> anyhow::Result<()> {
    let store = SessionStore::open(config.data_dir())?;
    let report = store.recover()?;

    if cmd.json {
        let json = serde_json::json!({
            "recovered": report.recovered,
            "quarantined": report.quarantined,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if report.is_empty() {
        println!("Nothing to recover.");
        return Ok(());
    }
    for id in &report.recovered {
        println!("Sealed open session {id}");
    }
    for path in &report.quarantined {
        println!("Quarantined unreadable container {}", path.display());
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let store = SessionStore::open(config.data_dir())?;
    let sessions = store.list_sessions()?;

    let open = sessions.iter().filter(|s| !s.sealed).count();
    let records: u64 = sessions.iter().map(|s| s.records).sum();
    let latest = sessions.last().map(|s| s.id.clone());

    if cmd.json {
        let json = serde_json::json!({
            "data_dir": config.data_dir(),
            "sessions": sessions.len(),
            "open_sessions": open,
            "records": records,
            "latest_session": latest,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("riderec status");
    println!("--------------");
    println!("Data directory: {}", config.data_dir().display());
    println!("Sessions:       {}", sessions.len());
    println!("Open sessions:  {open}");
    println!("Records:        {records}");
    if let Some(latest) = latest {
        println!("Latest session: {latest}");
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Data directory:  {}", config.data_dir().display());
                println!("  Queue depth:     {}", config.storage.queue_depth);
                println!();
                println!("[GPS]");
                println!(
                    "  gpsd:            {}:{}",
                    config.gps.gpsd_host, config.gps.gpsd_port
                );
                println!("  Cadence:         {}ms", config.gps.cadence_ms);
                println!("  Poll timeout:    {}ms", config.gps.poll_timeout_ms);
                println!();
                println!("[Environment]");
                println!("  Cadence:         {}ms", config.environment.cadence_ms);
                println!("  Poll timeout:    {}ms", config.environment.poll_timeout_ms);
                println!();
                println!("[Input]");
                println!("  Debounce:        {}ms", config.input.debounce_ms);
                println!("  Long press:      {}ms", config.input.long_press_ms);
                println!();
                println!("[Recorder]");
                println!("  Fix timeout:     {}s", config.recorder.fix_timeout_secs);
                println!("  Waypoint label:  {}", config.recorder.waypoint_label);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.clone().unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
