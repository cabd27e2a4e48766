//! clauseguard - contract clause risk analysis.
//!
//! Splits a contract into text chunks, asks a language model which clauses
//! each chunk contains, merges the answers into one aggregate and projects it
//! onto risk tiers using a toxicity classification.

pub mod aggregate;
pub mod classify;
pub mod cli;
pub mod config;
pub mod extract;
pub mod llm;
pub mod models;
pub mod repository;
pub mod server;
pub mod services;
pub mod storage;
