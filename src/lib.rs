pub mod config;
pub mod discovery;
pub mod hub;
pub mod models;
pub mod project;
pub mod report;
pub mod runner;
pub mod server;
