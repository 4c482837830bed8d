//! Kapacitor UDF binding: options, the per-connection handler, and the
//! indicators it drives.

pub mod accepter;
pub mod annotation_handler;
pub mod config;
pub mod indicators;
