//! Sign-up intake server library.
//!
//! Bet-slip sign-up submission, asynchronous vision extraction with retries,
//! and the human review workflow.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
