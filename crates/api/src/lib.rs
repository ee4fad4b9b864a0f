//! HTTP API: batch upload and job-status polling.

pub mod app;
pub mod config;
