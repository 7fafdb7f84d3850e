use anyhow::Result;
use clap::Parser;
use factorio_modkit::{
    cli::{self, Cli},
    config::{self, AppConfig},
    logging,
};
use tracing::debug;

fn main() -> Result<()> {
    let args = Cli::parse();
    let data_dir = config::base_data_dir()?;
    let _guard = logging::init(&data_dir, args.verbose)?;

    let mut config = AppConfig::load_or_create_in(&data_dir)?;
    config.apply_env();
    cli::apply_flags(&mut config, &args);
    config.validate()?;
    debug!(root = %config.server_root.display(), game = %config.target().label(), "configuration loaded");

    cli::ensure_authorized(&config.server, &args.command)?;
    let manager = cli::build_manager(&config);
    cli::run(&manager, args.command, args.format)
}
