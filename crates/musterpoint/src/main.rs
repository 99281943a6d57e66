//! `muster` - CLI for musterpoint
//!
//! This binary drives muster sessions stored in the local database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::de::DeserializeOwned;

use musterpoint::cli::{
    AnnounceCommand, Cli, Command, ConfigCommand, OutputFormat, PeopleCommand, RosterCommand,
};
use musterpoint::{
    drive, init_logging, open_or_offline, ClockEvent, Config, ManualClock, MusterSession, Person, SafetyStatus,
    SessionClock, SessionRecord, SqliteGateway, StaffRecord, TokioClock, VisitorRecord,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Activate(cmd) => {
            let mut session = open_session(&config)?;
            let record = session.activate(cmd.kind.into(), &cmd.by)?;
            println!(
                "Activated {} muster {} ({} people on the roster)",
                record.session_type, record.id, record.total_people
            );
            warn_if_degraded(&session);
            Ok(())
        }
        Command::Deactivate(cmd) => handle_deactivate(&config, cmd.yes),
        Command::Cancel => {
            let mut session = open_session(&config)?;
            let record = session.cancel()?;
            println!("Cancelled muster {}", record.id);
            warn_if_degraded(&session);
            Ok(())
        }
        Command::Safe(cmd) => {
            let mut session = open_session(&config)?;
            let record = session.mark_safe(&cmd.person, &cmd.zone)?;
            print_progress(&record);
            warn_if_degraded(&session);
            Ok(())
        }
        Command::Missing(cmd) => {
            let mut session = open_session(&config)?;
            let record = session.mark_missing(&cmd.person)?;
            print_progress(&record);
            warn_if_degraded(&session);
            Ok(())
        }
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Zones(cmd) => handle_zones(&config, cmd.json),
        Command::People(cmd) => handle_people(&config, &cmd),
        Command::Roster(cmd) => handle_roster(&config, cmd),
        Command::History(cmd) => handle_history(&config, cmd.json),
        Command::Announce(cmd) => handle_announce(&config, &cmd),
        Command::Watch => handle_watch(&config),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_session(config: &Config) -> Result<MusterSession> {
    open_session_with(config, Box::new(ManualClock::new()))
}

fn open_session_with(config: &Config, clock: Box<dyn SessionClock>) -> Result<MusterSession> {
    let zones = config.zone_registry()?;
    Ok(MusterSession::open(
        config.session_settings(),
        zones,
        open_or_offline(&config.database_path()),
        clock,
    ))
}

fn warn_if_degraded(session: &MusterSession) {
    if session.is_degraded() {
        eprintln!("Warning: storage is unavailable, this change was not saved.");
    }
}

fn print_progress(record: &SessionRecord) {
    let stats = record.statistics();
    println!(
        "{}/{} safe ({}%), {} missing, {} unaccounted",
        stats.safe, stats.total, stats.percentage, stats.missing, stats.unknown
    );
}

fn handle_deactivate(config: &Config, yes: bool) -> Result<()> {
    let mut session = open_session(config)?;
    let stats = session.get_statistics();

    if session.is_active() && stats.missing > 0 && !yes {
        println!("{} people are still reported missing:", stats.missing);
        for person in session.get_people_with_status(SafetyStatus::Missing) {
            println!("  {} ({})", person.name, person.id);
        }
        if !confirm("End the muster anyway?")? {
            println!("Muster left active.");
            return Ok(());
        }
    }

    let report = session.deactivate()?;
    println!("Completed muster {}", report.session.id);
    print_progress(&report.session);
    if report.has_warning() {
        println!(
            "Warning: {} people were still missing at close.",
            report.missing_at_close
        );
    }
    warn_if_degraded(&session);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let session = open_session(config)?;
    let stats = session.get_statistics();
    let storage = SqliteGateway::open(config.database_path())
        .and_then(|gateway| gateway.stats())
        .ok();

    if json {
        let status = serde_json::json!({
            "site": config.site.name,
            "databasePath": config.database_path(),
            "storage": storage,
            "session": session.current_session(),
            "statistics": stats,
            "zones": session.get_zone_summaries(),
            "countdownRemaining": session.countdown_remaining(),
            "degraded": session.is_degraded(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", config.site.name);
    println!("{}", "-".repeat(config.site.name.len().max(10)));
    match session.current_session() {
        Some(record) => {
            println!("Session:       {}", record.id);
            println!("Type:          {}", record.session_type);
            println!("Status:        {}", record.status);
            println!("Activated by:  {}", record.activated_by);
            println!(
                "Started:       {}",
                record.start_time.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Elapsed:       {}", format_elapsed(record.elapsed(Utc::now())));
        }
        None => println!("Session:       none"),
    }
    println!(
        "Accounted for: {}/{} ({}%)",
        stats.safe, stats.total, stats.percentage
    );
    println!("Missing:       {}", stats.missing);
    println!("Unknown:       {}", stats.unknown);
    match storage {
        Some(storage) => println!(
            "Database:      {} ({} people, {} sessions, {} bytes)",
            config.database_path().display(),
            storage.people,
            storage.sessions,
            storage.db_size_bytes
        ),
        None => println!(
            "Database:      {} (unavailable)",
            config.database_path().display()
        ),
    }
    warn_if_degraded(&session);
    Ok(())
}

fn handle_zones(config: &Config, json: bool) -> Result<()> {
    let session = open_session(config)?;
    let zones = session.get_zone_summaries();

    if json {
        println!("{}", serde_json::to_string_pretty(zones)?);
        return Ok(());
    }

    println!(
        "{:<14} {:<20} {:<18} {:>7} {:>5} {:>7} {:>7}",
        "ZONE", "NAME", "MUSTER POINT", "PRESENT", "SAFE", "MISSING", "UNKNOWN"
    );
    for zone in zones {
        let flag = if zone.over_capacity() { " over capacity" } else { "" };
        println!(
            "{:<14} {:<20} {:<18} {:>7} {:>5} {:>7} {:>7}{flag}",
            zone.id,
            zone.name,
            zone.muster_point,
            zone.current_count,
            zone.safe_count,
            zone.missing_count,
            zone.unknown_count()
        );
    }
    Ok(())
}

fn handle_people(config: &Config, cmd: &PeopleCommand) -> Result<()> {
    let session = open_session(config)?;

    let mut people = match &cmd.search {
        Some(query) => session.search_people(query),
        None => session.get_people_in_zone(None),
    };
    if let Some(zone) = &cmd.zone {
        people.retain(|p| &p.last_known_zone == zone);
    }
    if let Some(status) = cmd.status {
        let status: SafetyStatus = status.into();
        people.retain(|p| p.status == status);
    }

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&people)?),
        OutputFormat::Plain => {
            for person in &people {
                println!("{}\t{}\t{}\t{}", person.id, person.name, person.last_known_zone, person.status);
            }
        }
        OutputFormat::Table => print_people_table(&people),
    }
    Ok(())
}

fn print_people_table(people: &[Person]) {
    println!(
        "{:<12} {:<24} {:<20} {:<10} {:<14} {:<8}",
        "ID", "NAME", "COMPANY", "TYPE", "ZONE", "STATUS"
    );
    for person in people {
        println!(
            "{:<12} {:<24} {:<20} {:<10} {:<14} {:<8}",
            person.id,
            person.name,
            person.company,
            person.person_type,
            person.last_known_zone,
            person.status
        );
    }
    println!();
    println!("{} people", people.len());
}

fn handle_roster(config: &Config, cmd: RosterCommand) -> Result<()> {
    match cmd {
        RosterCommand::Import { visitors, staff } => {
            let visitors: Vec<VisitorRecord> = read_records(visitors.as_deref())?;
            let staff: Vec<StaffRecord> = read_records(staff.as_deref())?;

            let mut session = open_session(config)?;
            let count = session.import_roster(&visitors, &staff)?;
            println!("Imported {count} people.");
            warn_if_degraded(&session);
        }
    }
    Ok(())
}

fn read_records<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn handle_history(config: &Config, json: bool) -> Result<()> {
    let mut session = open_session(config)?;
    let history = session.history();

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No muster sessions recorded.");
        return Ok(());
    }
    println!(
        "{:<28} {:<7} {:<10} {:<20} {:>9} {:>6} {:>8}",
        "SESSION", "TYPE", "STATUS", "STARTED", "DURATION", "SAFE", "MISSING"
    );
    let now = Utc::now();
    for record in &history {
        println!(
            "{:<28} {:<7} {:<10} {:<20} {:>9} {:>6} {:>8}",
            record.id,
            record.session_type.as_str(),
            record.status.as_str(),
            record.start_time.format("%Y-%m-%d %H:%M"),
            format_elapsed(record.elapsed(now)),
            format!("{}/{}", record.safe_people, record.total_people),
            record.missing_people
        );
    }
    Ok(())
}

fn handle_announce(config: &Config, cmd: &AnnounceCommand) -> Result<()> {
    let session = open_session(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let recipients = runtime.block_on(async {
        if cmd.unaccounted {
            session.alert_unaccounted(&cmd.message).await
        } else {
            session.announce(&cmd.message).await
        }
    })?;
    println!("Announcement sent to {recipients} people.");
    Ok(())
}

fn handle_watch(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(watch(config))
}

// Timers are spawned when the session resumes, so this must run inside the runtime
async fn watch(config: &Config) -> Result<()> {
    let (clock, mut events) = TokioClock::new(16);
    let mut session = open_session_with(config, Box::new(clock))?;

    let Some(record) = session.current_session().filter(|r| r.is_active()).cloned() else {
        println!("No active muster session.");
        return Ok(());
    };
    println!("Watching muster {} (Ctrl-C to stop)", record.id);
    print_progress(&record);

    let watched = drive(&mut session, &mut events, |session, event| match event {
        ClockEvent::Refresh => {
            if let Some(record) = session.current_session() {
                print_progress(record);
            }
            warn_if_degraded(session);
        }
        ClockEvent::CountdownTick { remaining_secs, .. } => {
            println!("Drill countdown: {remaining_secs}s");
        }
        ClockEvent::CountdownComplete { .. } => println!("Drill countdown complete."),
    });

    tokio::select! {
        result = watched => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopped watching.");
            return Ok(());
        }
    }

    if let Some(record) = session.current_session() {
        println!("Muster {} {}.", record.id, record.status);
    }
    Ok(())
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Site]");
                println!("  Name:               {}", config.site.name);
                println!("  Default zone:       {}", config.site.default_zone);
                for zone in &config.site.zones {
                    println!(
                        "  Zone {:<14} {} -> {} (capacity {})",
                        zone.id, zone.name, zone.muster_point, zone.capacity
                    );
                }
                println!();
                println!("[Clock]");
                println!(
                    "  Refresh interval:   {}s",
                    config.clock.refresh_interval_secs
                );
                println!(
                    "  Drill countdown:    {}s",
                    config.clock.drill_countdown_secs
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
