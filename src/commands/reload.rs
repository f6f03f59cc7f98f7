use anyhow::Result;

use crate::cli::ReloadOpts;
use crate::store::Store;

/// Run the reload command: load the currently loaded source again.
///
/// # Errors
///
/// Returns an error when nothing is loaded or the load fails.
pub fn run(opts: &ReloadOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.reload(opts.apply.to_options())?;
    super::print_load_result(&res, verbose);
    Ok(())
}
