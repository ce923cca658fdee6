// Library root: re-exports all modules so integration tests and the CLI
// binary can access the crate's public API.

pub mod boxscore;
pub mod config;
pub mod db;
pub mod normalize;
pub mod pipeline;
pub mod projections;
pub mod publish;
pub mod reference;
pub mod resolve;
pub mod schedule;
pub mod scoring;
pub mod service;
pub mod slate;
