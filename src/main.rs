use vvstudio::cli::{Args, Command};
use vvstudio::config::{LOG_FILE, PathConfig, Settings};
use vvstudio::coordinator::ProjectCoordinator;
use vvstudio::core::cancel::CancelToken;
use vvstudio::entities::{ProjectTemplate, read_session};
use vvstudio::store::SaveOutcome;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// How long to wait for thumbnails and other background jobs on exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| path_config.data_file(LOG_FILE));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings = Settings::load(&path_config.settings_file());
    info!("Settings: {}", path_config.settings_file().display());

    let mut coordinator = ProjectCoordinator::from_settings(&settings, &path_config);
    let result = run(args.command, &mut coordinator, &settings);

    coordinator.close_current_project();
    if !coordinator.store().background().wait_idle(DRAIN_TIMEOUT) {
        warn!("Background jobs still running after {:?}, exiting anyway", DRAIN_TIMEOUT);
    }
    result
}

fn run(command: Command, coordinator: &mut ProjectCoordinator, settings: &Settings) -> Result<()> {
    match command {
        Command::Create {
            title,
            template,
            media_policy,
            directory,
        } => {
            let policy = media_policy.unwrap_or(settings.default_media_policy);
            let session = coordinator.create_new_project(&title, template, policy, &directory)?;
            let s = read_session(&session);
            println!(
                "Created '{}' ({} template, {} media) at {}",
                s.manifest().title,
                template,
                policy,
                s.package_path().map(Path::display).map(|d| d.to_string()).unwrap_or_default()
            );
        }

        Command::Info { project } => {
            let session = coordinator.open_project(&project)?;
            let links = coordinator.media().verify_links(&session);
            let versions = coordinator.store().list_versions(&project)?;
            let s = read_session(&session);
            let m = s.manifest();
            println!("Title:     {}", m.title);
            println!("Id:        {}", m.project_id);
            println!("Schema:    {} (app {})", m.schema_version, m.app_version);
            println!("Created:   {}", m.created_at);
            println!("Updated:   {}", m.updated_at);
            println!("Policy:    {}", m.media_policy);
            println!(
                "Media:     {} ({} linked, {} missing)",
                s.media().len(),
                s.media().iter().filter(|r| r.is_linked).count(),
                links.missing.len()
            );
            println!("Versions:  {}", versions.len());
            for reference in s.media() {
                println!(
                    "  {} {:<6} {:>12} B  {}",
                    reference.id,
                    reference.media_type.as_str(),
                    reference.file_size,
                    reference.file_name
                );
            }
        }

        Command::Import { project, files } => {
            coordinator.open_project(&project)?;
            let report = coordinator.import_media(&files, &CancelToken::new(), |fraction| {
                eprint!("\rImporting... {:>3.0}%", fraction * 100.0);
                let _ = std::io::stderr().flush();
            })?;
            eprintln!();
            save(coordinator)?;

            println!("Imported {} of {} file(s)", report.imported.len(), files.len());
            for failure in &report.failed {
                println!("  failed: {}", failure);
            }
        }

        Command::Collect { project } => {
            coordinator.open_project(&project)?;
            let report = coordinator.collect_all_media()?;
            save(coordinator)?;

            println!("Collected {} linked file(s)", report.collected.len());
            for failure in &report.failed {
                println!("  failed: {}", failure);
            }
        }

        Command::Duplicate {
            project,
            title,
            directory,
        } => {
            coordinator.open_project(&project)?;
            let copy = coordinator.duplicate_current_project(&title, directory.as_deref())?;
            let s = read_session(&copy);
            println!(
                "Duplicated as '{}' at {}",
                s.manifest().title,
                s.package_path().map(Path::display).map(|d| d.to_string()).unwrap_or_default()
            );
        }

        Command::Delete { project } => {
            let trashed = coordinator.store().delete_project(&project)?;
            println!("Moved to {}", trashed.display());
        }

        Command::Versions { project } => {
            let versions = coordinator.store().list_versions(&project)?;
            if versions.is_empty() {
                println!("No versions");
            }
            for version in versions {
                println!("v{:<5} {}", version.number, version.created_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
            }
        }

        Command::Restore { project, version } => {
            let session = coordinator.open_project(&project)?;
            coordinator.store().restore_version(&session, version)?;
            save(coordinator)?;
            println!("Restored version {} of {}", version, project.display());
        }

        Command::Templates => {
            for template in ProjectTemplate::ALL {
                let components = template.components();
                let count = |value: &serde_json::Value, key: &str| {
                    value[key].as_array().map(Vec::len).unwrap_or(0)
                };
                println!(
                    "{:<14} {} input(s), {} bus(es)",
                    template.name(),
                    count(&components.routing, "inputSources"),
                    count(&components.mixer, "audioBuses")
                );
            }
        }
    }
    Ok(())
}

/// Explicit save of the current project; errors reach the user.
fn save(coordinator: &ProjectCoordinator) -> Result<()> {
    match coordinator.save_current_project()? {
        SaveOutcome::Committed { version } => {
            info!("Saved (version {})", version);
            Ok(())
        }
        SaveOutcome::Cancelled => bail!("save was superseded by another save"),
    }
}
