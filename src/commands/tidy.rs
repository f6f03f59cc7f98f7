use anyhow::Result;

use crate::store::Store;

/// Run the tidy command: sweep unreferenced backup objects.
///
/// # Errors
///
/// Returns an error when the store is not installed or the sweep fails.
pub fn run(verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.tidy()?;

    println!("removed {} unreferenced backup object(s)", res.removed_count);
    super::print_changed_paths(verbose, &res.changed_paths);
    Ok(())
}
