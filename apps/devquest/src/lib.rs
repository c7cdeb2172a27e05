//! # DevQuest Application Library
//!
//! The async half of the DevQuest backend: HTTP API, CLI, configuration and
//! identity providers. The game rules live in `devquest-core`.

pub mod api;
pub mod cli;
pub mod config;
pub mod identity;
