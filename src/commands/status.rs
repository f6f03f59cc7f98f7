use anyhow::Result;

use crate::cli::StatusOpts;
use crate::store::{LoadState, StatusSnapshot, Store};
use crate::store::ops::source_display_name;

/// Run the status command.
///
/// # Errors
///
/// Returns an error when the store is not installed or scanning fails.
pub fn run(opts: &StatusOpts) -> Result<()> {
    let store = Store::default_store()?;
    let snapshot = store.status()?;

    if opts.backups {
        render_backup_status(&snapshot);
        return Ok(());
    }

    if snapshot.source.state == LoadState::Loaded && !snapshot.source.loc.trim().is_empty() {
        println!(
            "On source {}",
            source_display_name(&snapshot.source.name, &snapshot.source.loc)
        );
    } else {
        println!("No source loaded");
    }

    println!();
    println!("Tracked objects:");
    if snapshot.tracked.is_empty() {
        println!("  (none)");
    } else {
        for tracked in &snapshot.tracked {
            // T = tracked, B = backed up, ! = backup missing; a trailing
            // marker flags drift.
            let tag = match (&tracked.prev_digest, tracked.backup_present) {
                (None, _) => "T",
                (Some(_), true) => "B",
                (Some(_), false) => "!",
            };
            let drift = if tracked.missing {
                "  (missing)"
            } else if tracked.drifted {
                "  (modified)"
            } else {
                ""
            };
            println!("  {tag}  {}{drift}", tracked.path.display());
        }
    }

    println!();
    render_backup_status(&snapshot);
    Ok(())
}

fn render_backup_status(snapshot: &StatusSnapshot) {
    println!("Backups referenced by lock:");
    if snapshot.backup_refs.is_empty() {
        println!("  (none)");
    } else {
        for backup_ref in &snapshot.backup_refs {
            let state = if backup_ref.present { "present" } else { "missing" };
            println!("  {state}  {}", backup_ref.digest);
            for path in &backup_ref.paths {
                println!("       {}", path.display());
            }
        }
    }

    println!();
    println!("Unreferenced backup objects:");
    if snapshot.orphaned_backups.is_empty() {
        println!("  (none)");
    } else {
        for key in &snapshot.orphaned_backups {
            println!("  orphan  {key}");
        }
    }

    if !snapshot.broken_backups.is_empty() {
        println!();
        println!("Broken backup entries:");
        for key in &snapshot.broken_backups {
            println!("  broken  {key}");
        }
    }
}
