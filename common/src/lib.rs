// Common library for triggering remote jobs and tailing their logs

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod job_details;
pub mod models;
pub mod ocapi;
pub mod output;
pub mod runner;
pub mod store;
pub mod telemetry;
