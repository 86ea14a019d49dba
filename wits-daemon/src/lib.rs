//! WITS generator daemon library
//!
//! Exposes the command line and configuration layers for integration testing.

pub mod cli;
pub mod config;
