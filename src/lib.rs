//! Transactional dotfiles source manager.
//!
//! tohru applies a declarative manifest (symlinks, file copies, directory
//! creations) to the filesystem, records every object it creates in a
//! durable lock file, and reverses those changes precisely later. Anything
//! an apply would destroy is preserved in a content-addressed backup store
//! and restored when the owning entry goes away; a failed load rolls the
//! filesystem back to its pre-load state.
//!
//! The public API is organised into four layers:
//!
//! - **[`digest`]** — typed content addressing for files, symlinks, and
//!   directory trees
//! - **[`manifest`]** — manifest decoding and import-graph resolution
//! - **[`store`]** — lock state, the backup object store, and the
//!   transactional apply/unload engine
//! - **[`commands`]** — top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod digest;
pub mod error;
pub mod fsutil;
pub mod logging;
pub mod manifest;
pub mod platform;
pub mod store;
pub mod version;
