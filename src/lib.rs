//! Cash pools, FIFO spending and currency exchange for a trip ledger.

pub mod compound;
pub mod config;
pub mod entry;
pub mod error;
pub mod fifo;
pub mod ledger;
pub mod lifecycle;
pub mod request;
pub mod service;
pub mod types;
pub mod utils;
