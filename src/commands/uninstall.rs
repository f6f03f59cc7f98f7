use anyhow::Result;

use crate::cli::UninstallOpts;
use crate::store::Store;

/// Run the uninstall command: unload everything, then remove the store.
///
/// # Errors
///
/// Returns an error when the store is not installed or the unload fails.
pub fn run(opts: &UninstallOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.uninstall(opts.apply.to_options())?;
    super::print_unload_result(&res, verbose);
    super::print_changed_paths(verbose, &[store.root().to_path_buf()]);

    println!("uninstalled tohru store from {}", store.root().display());
    Ok(())
}
