pub mod config;
pub mod gc;
pub mod goals;
pub mod humanize;
pub mod log;
pub mod observability;
