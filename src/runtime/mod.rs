pub mod config;
pub mod daemon;
pub mod mgmt;
pub mod transport;
