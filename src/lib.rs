//! Set-associative L1 data cache simulator. Each simulated core replays a
//! load/store trace against its own cache; all cores share one backing store.

pub mod addr;
pub mod cache;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gen;
pub mod memory;
pub mod replace;
pub mod sim;
pub mod stats;
pub mod trace;
pub mod write;
