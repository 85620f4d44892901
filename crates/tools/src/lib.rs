//! Tool executors for Maestro specialist packs.
//!
//! Every executor takes a [`sandbox::SandboxPolicy`] (or the workspace path)
//! plus typed arguments and returns a JSON-serialisable result dict. Errors
//! are classified [`maestro_domain::error::ToolError`]s; the execution engine
//! turns them into error dicts for the model, never into aborted runs.

pub mod browser;
pub mod file_ops;
pub mod sandbox;
pub mod test_runner;
pub mod web;

pub use sandbox::SandboxPolicy;
