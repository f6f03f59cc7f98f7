use anyhow::Result;
use clap::Parser;

use tohru::cli::{Cli, Command};
use tohru::{commands, logging, version};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    logging::init(args.verbose);

    match args.command {
        Command::Install(opts) => commands::install::run(&opts, args.verbose),
        Command::Load(opts) => commands::load::run(&opts, args.verbose),
        Command::Reload(opts) => commands::reload::run(&opts, args.verbose),
        Command::Unload(opts) => commands::unload::run(&opts, args.verbose),
        Command::Uninstall(opts) => commands::uninstall::run(&opts, args.verbose),
        Command::Status(opts) => commands::status::run(&opts),
        Command::Tidy => commands::tidy::run(args.verbose),
        Command::Validate(opts) => commands::validate::run(&opts, args.verbose),
        Command::Version => {
            let version = option_env!("TOHRU_VERSION").unwrap_or(version::APP_VERSION);
            println!("tohru {version}");
            Ok(())
        }
    }
}
