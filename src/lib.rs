//! Web site audit pipeline: page discovery, per-page checkers, visual
//! regression against baselines, and issue aggregation per run.

pub mod api;
pub mod browser;
pub mod checkers;
pub mod cli;
pub mod config;
pub mod db;
pub mod discovery;
pub mod errors;
pub mod http;
pub mod issues;
pub mod models;
pub mod pipeline;
pub mod visual;
