//! intaked — document intake scheduler.
//!
//! A long-running daemon that drains a consumption directory of pending
//! documents on every tick and, at a throttled interval, pulls attachments
//! from a mail drop into that same directory.

pub mod config;
pub mod consumer;
pub mod error;
pub mod mail;
pub mod scheduler;
pub mod storage;
