//! Scoring pipeline for security-remediation challenge submissions
//!
//! A submission's code is run through static analyzers, a per-challenge
//! heuristic rule and a compile-only sandbox; the worker persists the
//! merged result.

pub mod analyzers;
pub mod config;
pub mod core;
pub mod error;
pub mod rules;
pub mod runner;
pub mod sandbox;
pub mod scoring;
pub mod snippet;
pub mod store;
pub mod worker;

pub use config::Settings;
pub use scoring::ScoringService;
pub use worker::ScoringWorker;
