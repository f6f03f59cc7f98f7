use anyhow::Result;

use crate::cli::UnloadOpts;
use crate::store::Store;

/// Run the unload command.
///
/// # Errors
///
/// Returns an error when the store is not installed or a managed object
/// refuses removal under the given options.
pub fn run(opts: &UnloadOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.unload(opts.apply.to_options())?;
    super::print_unload_result(&res, verbose);
    Ok(())
}
