//! CLI subcommands.

pub mod compare;
pub mod config;
pub mod scan;
