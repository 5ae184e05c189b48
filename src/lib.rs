//! Purpose: Library crate behind the `roomsync` CLI.
//! Exports: `core` (config, errors, config-file store, reconciliation) and `api`.
//! Role: Gateway session client plus room-state reconciliation into plugin config files.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
