use crate::{
    access::ServerProfile,
    config::AppConfig,
    file_store::LocalFileStore,
    manager::{ModManager, ToggleOutcome},
    mod_list::ModListStore,
    models::{SortField, SortOrder},
    portal::{PortalClient, UreqTransport},
    version::TargetPlatform,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Parser, Debug)]
#[command(name = "modkit", version, about = "Factorio server mod installer")]
pub struct Cli {
    #[arg(long, global = true, help = "Server directory holding mods/ and data/")]
    pub root: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[arg(long, global = true, help = "Target Factorio version, e.g. 2.0 or latest")]
    pub game_version: Option<String>,
    #[arg(long, global = true, help = "Treat the target as an experimental build")]
    pub experimental: bool,
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Installed mods with their versions
    List {
        #[arg(long, help = "Skip portal lookups")]
        offline: bool,
    },
    Search {
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Downloads)]
        sort: SortArg,
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, help = "Only mods whose latest release runs on the target")]
        compatible: bool,
    },
    Show {
        name: String,
    },
    Versions {
        name: String,
    },
    Install {
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    Toggle {
        name: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    ToggleAll,
    Remove {
        name: String,
    },
    Updates,
    Update {
        name: String,
    },
    UpdateAll,
    /// Drop every cached portal response
    Refresh,
    Cache,
    /// Save a release archive locally without installing it
    Download {
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

impl Command {
    /// Commands touching the server's files need an authorized profile.
    fn touches_server(&self) -> bool {
        matches!(
            self,
            Command::List { .. }
                | Command::Install { .. }
                | Command::Toggle { .. }
                | Command::Enable { .. }
                | Command::Disable { .. }
                | Command::ToggleAll
                | Command::Remove { .. }
                | Command::Updates
                | Command::Update { .. }
                | Command::UpdateAll
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Downloads,
    Name,
    Title,
    Updated,
}

impl From<SortArg> for SortField {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Downloads => SortField::Downloads,
            SortArg::Name => SortField::Name,
            SortArg::Title => SortField::Title,
            SortArg::Updated => SortField::Updated,
        }
    }
}

/// Folds command-line flags into the loaded configuration.
pub fn apply_flags(config: &mut AppConfig, cli: &Cli) {
    if let Some(root) = &cli.root {
        config.server_root = root.clone();
    }
    if let Some(version) = &cli.game_version {
        let target = TargetPlatform::from_server_variable(Some(version.as_str()));
        config.game_version = target.version.to_string();
        config.experimental = target.experimental;
    }
    if cli.experimental {
        config.experimental = true;
    }
}

pub fn build_manager(config: &AppConfig) -> ModManager {
    let transport = Arc::new(UreqTransport::new(Duration::from_secs(10)));
    let portal = PortalClient::new(transport, config.portal_settings());
    let files = Arc::new(LocalFileStore::new(&config.server_root));
    let store = ModListStore::new(files, &config.mods_dir, &config.mod_list_file);
    ModManager::new(portal, store, config.target())
        .with_server_settings_path(&config.server_settings_path)
        .with_credentials(config.credentials.clone())
}

pub fn ensure_authorized(profile: &ServerProfile, command: &Command) -> Result<()> {
    if command.touches_server() && !profile.can_manage_mods() {
        bail!(
            "server '{}' is not a Factorio server; mod management is unavailable",
            profile.egg_name
        );
    }
    Ok(())
}

pub fn run(manager: &ModManager, command: Command, format: OutputFormat) -> Result<()> {
    match command {
        Command::List { offline } => {
            let records = manager.list_installed(!offline);
            emit(format, &records, |records| {
                if records.is_empty() {
                    println!("No mods installed.");
                }
                for record in records {
                    let enabled = if record.enabled { "x" } else { " " };
                    let version = record.version.as_deref().unwrap_or("-");
                    let update = record
                        .update_available
                        .as_deref()
                        .map(|latest| format!("  -> {latest}"))
                        .unwrap_or_default();
                    println!(
                        "[{enabled}] {name:<32} {version:<10}{update}",
                        name = record.name
                    );
                }
            })
        }
        Command::Search {
            query,
            category,
            sort,
            asc,
            limit,
            compatible,
        } => {
            let order = if asc { SortOrder::Asc } else { SortOrder::Desc };
            let result = manager.browse(
                query.as_deref(),
                category.as_deref(),
                sort.into(),
                order,
                limit,
                compatible,
            )?;
            emit(format, &result, |result| {
                for summary in &result.results {
                    println!(
                        "{name:<32} {downloads:>9}  {title}",
                        name = summary.name,
                        downloads = summary.downloads_count,
                        title = summary.display_title()
                    );
                }
                println!("{} match(es)", result.pagination.count);
            })
        }
        Command::Show { name } => {
            let view = manager.mod_detail(&name)?;
            emit(format, &view, |view| {
                println!("{} ({})", view.details.display_title(), view.details.name);
                if let Some(owner) = &view.details.owner {
                    println!("  by {owner}");
                }
                if let Some(summary) = &view.details.summary {
                    println!("  {summary}");
                }
                println!(
                    "  latest for {}: {}",
                    manager.target().label(),
                    view.latest_compatible.as_deref().unwrap_or("none")
                );
                let state = match (view.installed, view.enabled) {
                    (true, true) => "installed, enabled",
                    (true, false) => "installed, disabled",
                    _ => "not installed",
                };
                println!("  {state}");
                for dependency in &view.dependencies {
                    let constraint = dependency.version_constraint.as_deref().unwrap_or("");
                    println!(
                        "  - {kind:<15} {name} {constraint}",
                        kind = dependency.kind.label(),
                        name = dependency.name
                    );
                }
            })
        }
        Command::Versions { name } => {
            let versions = manager.available_versions(&name)?;
            emit(format, &versions, |versions| {
                for option in versions {
                    let marker = if option.is_compatible { "*" } else { " " };
                    println!(
                        "{marker} {version:<12} factorio {factorio:<6} {released}",
                        version = option.version,
                        factorio = option.factorio_version.as_deref().unwrap_or("?"),
                        released = format_date(option.released_at)
                    );
                }
            })
        }
        Command::Install {
            name,
            version,
            disabled,
        } => {
            let report = manager.install(&name, version.as_deref(), !disabled)?;
            emit(format, &report, |report| {
                print_names("Installed", &report.installed);
                print_names("Skipped", &report.skipped);
                print_names("Failed", &report.failed);
            })?;
            if !report.is_success() {
                bail!("{} mod(s) failed to install", report.failed.len());
            }
            Ok(())
        }
        Command::Toggle { name } => emit(format, &manager.toggle(&name)?, print_toggle),
        Command::Enable { name } => emit(format, &manager.set_enabled(&name, true)?, print_toggle),
        Command::Disable { name } => {
            emit(format, &manager.set_enabled(&name, false)?, print_toggle)
        }
        Command::ToggleAll => {
            let enabled = manager.toggle_all()?;
            emit(format, &enabled, |enabled| {
                if *enabled {
                    println!("All mods enabled");
                } else {
                    println!("All mods disabled");
                }
            })
        }
        Command::Remove { name } => {
            let deleted = manager.remove(&name)?;
            emit(format, &deleted, |deleted| {
                println!("Removed {name}");
                print_names("Deleted", deleted);
            })
        }
        Command::Updates => {
            let updates = manager.check_for_updates();
            emit(format, &updates, |updates| {
                if updates.is_empty() {
                    println!("Everything is up to date for {}.", manager.target().label());
                }
                for update in updates {
                    println!(
                        "{name:<32} {from} -> {to}",
                        name = update.name,
                        from = update.installed_version,
                        to = update.latest_version
                    );
                }
            })
        }
        Command::Update { name } => {
            let report = manager.update_one(&name)?;
            emit(format, &report, |report| {
                if report.skipped.contains(&name) {
                    println!("{name} is already up to date");
                }
                print_names("Installed", &report.installed);
                print_names("Failed", &report.failed);
            })
        }
        Command::UpdateAll => {
            let batch = manager.update_all();
            emit(format, &batch, |batch| {
                print_names("Updated", &batch.succeeded);
                print_names("Failed", &batch.failed);
                if batch.succeeded.is_empty() && batch.failed.is_empty() {
                    println!("Nothing to update.");
                }
            })?;
            if !batch.failed.is_empty() {
                bail!("{} update(s) failed", batch.failed.len());
            }
            Ok(())
        }
        Command::Refresh => {
            let stats = manager.refresh_cache();
            emit(format, &stats, |stats| {
                println!("Cache cleared at {}", format_date(stats.last_refresh));
            })
        }
        Command::Cache => {
            let stats = manager.cache_stats();
            emit(format, &stats, |stats| {
                println!("{} live entries", stats.entries);
                println!("last refresh: {}", format_date(stats.last_refresh));
            })
        }
        Command::Download { name, version, out } => {
            let path = manager
                .download(&name, version.as_deref(), &out)
                .with_context(|| format!("download {name}"))?;
            emit(format, &path, |path| println!("Saved {}", path.display()))
        }
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn print_toggle(outcome: &ToggleOutcome) {
    let state = if outcome.enabled { "enabled" } else { "disabled" };
    println!("{} {state}", outcome.name);
    for issue in &outcome.issues {
        println!("  warning: {issue}");
    }
}

fn print_names(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("{label}: {}", names.join(", "));
    }
}

fn format_date(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|value| value.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}
