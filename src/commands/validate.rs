use anyhow::Result;

use crate::cli::ValidateOpts;
use crate::manifest::ImportTree;
use crate::store::Store;

/// Run the validate command.
///
/// # Errors
///
/// Returns an error when the source fails any pre-mutation check.
pub fn run(opts: &ValidateOpts, verbose: bool) -> Result<()> {
    let store = Store::default_store()?;
    let res = store.validate(opts.source.as_deref())?;

    println!("source {} is valid ({})", res.source_name, res.source_dir.display());
    println!(
        "  {} operation(s): {} link(s), {} file(s), {} dir(s)",
        res.op_count, res.link_count, res.file_count, res.dir_count
    );

    if verbose {
        println!("manifests:");
        render_import_tree(&res.import_tree, 1);
    }
    Ok(())
}

fn render_import_tree(tree: &ImportTree, depth: usize) {
    println!("{}{}", "  ".repeat(depth), tree.path.display());
    for import in &tree.imports {
        render_import_tree(import, depth + 1);
    }
}
