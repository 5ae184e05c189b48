// Core modules: configuration, errors, tokens, config-file storage, and reconciliation.
pub mod config;
pub mod error;
pub mod markers;
pub mod reconcile;
pub mod store;
pub mod token;
