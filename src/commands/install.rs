use anyhow::Result;

use crate::cli::InstallOpts;
use crate::store::Store;

/// Run the install command: initialize the store and optionally load a
/// source right away.
///
/// # Errors
///
/// Returns an error when the store is already installed or the initial
/// load fails.
pub fn run(opts: &InstallOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    store.install()?;

    println!("initialized tohru store in {}", store.root().display());
    super::print_changed_paths(
        verbose,
        &[store.backups_path(), store.config_path(), store.lock_path()],
    );

    let Some(source) = opts.source.as_deref() else {
        return Ok(());
    };

    let res = store.load(source, opts.apply.to_options())?;
    super::print_load_result(&res, verbose);
    Ok(())
}
