//! Top-level subcommand orchestration.
//!
//! Each handler resolves the default store, invokes one engine operation,
//! and prints a short human-readable summary. All domain errors surface as
//! [`anyhow::Error`] at this boundary.

pub mod install;
pub mod load;
pub mod reload;
pub mod status;
pub mod tidy;
pub mod uninstall;
pub mod unload;
pub mod validate;

use std::path::PathBuf;

use crate::store::{LoadResult, UnloadResult};

fn print_changed_paths(verbose: bool, paths: &[PathBuf]) {
    if !verbose || paths.is_empty() {
        return;
    }
    println!("changed paths:");
    for path in paths {
        println!("  {}", path.display());
    }
}

fn print_load_result(res: &LoadResult, verbose: bool) {
    if !res.unloaded_source_name.is_empty() || res.unloaded_tracked_count > 0 {
        let name = if res.unloaded_source_name.is_empty() {
            "previous source"
        } else {
            res.unloaded_source_name.as_str()
        };
        println!("unloaded {name} ({} managed object(s))", res.unloaded_tracked_count);
    }

    println!("loaded {} ({} tracked object(s))", res.source_name, res.tracked_count);
    if res.removed_backup_count > 0 {
        println!("cleaned {} unreferenced backup object(s)", res.removed_backup_count);
    }
    print_changed_paths(verbose, &res.changed_paths);
}

fn print_unload_result(res: &UnloadResult, verbose: bool) {
    if !res.source_name.is_empty() || res.removed_count > 0 {
        let name = if res.source_name.is_empty() {
            "source"
        } else {
            res.source_name.as_str()
        };
        println!("unloaded {name} ({} managed object(s))", res.removed_count);
    }
    if res.removed_backup_count > 0 {
        println!("cleaned {} unreferenced backup object(s)", res.removed_backup_count);
    }
    print_changed_paths(verbose, &res.changed_paths);
}
