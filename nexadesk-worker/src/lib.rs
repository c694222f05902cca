pub mod config;
pub mod job;
pub mod server;
pub mod worker;
