use clap::{Parser, Subcommand};

use crate::store;

/// Top-level CLI entry point for the tohru engine.
#[derive(Parser, Debug)]
#[command(
    name = "tohru",
    about = "Transactional dotfiles source manager",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (changed-path lists, debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every command that mutates managed state.
#[derive(Parser, Debug, Clone, Default)]
pub struct ApplyOpts {
    /// Overwrite existing files and tolerate missing or modified managed objects
    #[arg(short, long)]
    pub force: bool,

    /// Allow replacing modified managed files without full force behavior
    #[arg(long)]
    pub discard_changes: bool,
}

impl ApplyOpts {
    /// Convert to engine options.
    #[must_use]
    pub const fn to_options(&self) -> store::Options {
        store::Options {
            force: self.force,
            discard_changes: self.discard_changes,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the tohru store, optionally loading a source
    Install(InstallOpts),
    /// Load a source, unloading whatever is active first
    #[command(alias = "switch")]
    Load(LoadOpts),
    /// Re-load the currently loaded source
    Reload(ReloadOpts),
    /// Unload the current source and restore backups
    Unload(UnloadOpts),
    /// Unload everything and remove the tohru store
    Uninstall(UninstallOpts),
    /// Show tracked objects, drift, and backup health
    Status(StatusOpts),
    /// Remove backup objects no longer referenced by the lock
    Tidy,
    /// Check a source without applying it
    Validate(ValidateOpts),
    /// Print version information
    Version,
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InstallOpts {
    /// Source to load right after installing
    pub source: Option<String>,

    #[command(flatten)]
    pub apply: ApplyOpts,
}

/// Options for the `load` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct LoadOpts {
    /// Manifest file or directory containing tohru.toml
    pub source: String,

    #[command(flatten)]
    pub apply: ApplyOpts,
}

/// Options for the `reload` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ReloadOpts {
    #[command(flatten)]
    pub apply: ApplyOpts,
}

/// Options for the `unload` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct UnloadOpts {
    #[command(flatten)]
    pub apply: ApplyOpts,
}

/// Options for the `uninstall` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct UninstallOpts {
    #[command(flatten)]
    pub apply: ApplyOpts,
}

/// Options for the `status` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct StatusOpts {
    /// Show backup details only
    #[arg(long)]
    pub backups: bool,
}

/// Options for the `validate` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ValidateOpts {
    /// Source to validate; defaults to the currently loaded source
    pub source: Option<String>,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_load_with_source() {
        let cli = Cli::parse_from(["tohru", "load", "/srv/dotfiles"]);
        let Command::Load(opts) = cli.command else {
            panic!("expected load command");
        };
        assert_eq!(opts.source, "/srv/dotfiles");
        assert!(!opts.apply.force);
    }

    #[test]
    fn switch_is_an_alias_for_load() {
        let cli = Cli::parse_from(["tohru", "switch", "/srv/other"]);
        assert!(matches!(cli.command, Command::Load(_)));
    }

    #[test]
    fn parse_force_flags() {
        let cli = Cli::parse_from(["tohru", "load", "-f", "/srv/dotfiles"]);
        let Command::Load(opts) = cli.command else {
            panic!("expected load command");
        };
        assert!(opts.apply.force);
        assert!(!opts.apply.discard_changes);
    }

    #[test]
    fn parse_discard_changes() {
        let cli = Cli::parse_from(["tohru", "unload", "--discard-changes"]);
        let Command::Unload(opts) = cli.command else {
            panic!("expected unload command");
        };
        assert!(opts.apply.discard_changes);
        let options = opts.apply.to_options();
        assert!(options.discard_changes && !options.force);
    }

    #[test]
    fn parse_install_with_optional_source() {
        let cli = Cli::parse_from(["tohru", "install"]);
        let Command::Install(opts) = cli.command else {
            panic!("expected install command");
        };
        assert!(opts.source.is_none());

        let cli = Cli::parse_from(["tohru", "install", "/srv/dotfiles"]);
        let Command::Install(opts) = cli.command else {
            panic!("expected install command");
        };
        assert_eq!(opts.source.as_deref(), Some("/srv/dotfiles"));
    }

    #[test]
    fn parse_status_backups_flag() {
        let cli = Cli::parse_from(["tohru", "status", "--backups"]);
        let Command::Status(opts) = cli.command else {
            panic!("expected status command");
        };
        assert!(opts.backups);
    }

    #[test]
    fn parse_validate_without_source() {
        let cli = Cli::parse_from(["tohru", "validate"]);
        let Command::Validate(opts) = cli.command else {
            panic!("expected validate command");
        };
        assert!(opts.source.is_none());
    }

    #[test]
    fn parse_verbose_global() {
        let cli = Cli::parse_from(["tohru", "-v", "status"]);
        assert!(cli.verbose);
    }

    #[test]
    fn parse_tidy_and_version() {
        assert!(matches!(
            Cli::parse_from(["tohru", "tidy"]).command,
            Command::Tidy
        ));
        assert!(matches!(
            Cli::parse_from(["tohru", "version"]).command,
            Command::Version
        ));
    }
}
