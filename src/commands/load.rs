use anyhow::Result;

use crate::cli::LoadOpts;
use crate::store::Store;

/// Run the load command.
///
/// # Errors
///
/// Returns an error when the source cannot be resolved or applied; a
/// mid-apply failure reports that the filesystem was rolled back.
pub fn run(opts: &LoadOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.load(&opts.source, opts.apply.to_options())?;
    super::print_load_result(&res, verbose);
    Ok(())
}
