#![no_std]

#[cfg(test)]
extern crate alloc;

pub mod board;
pub mod checksum;
pub mod config;
pub mod scanner;
pub mod service;
pub mod storage;
pub mod usage;

pub use board::Board;
pub use config::LogConfig;
pub use service::{BootReport, FlushStatus, LogService};
pub use usage::{FeatureFlag, FeatureFlags, Mode, RetainedUsage};
