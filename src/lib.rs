//! music-tools: local music-library curation engine
//!
//! Maintains a persistent, incrementally-updated index of an audio
//! collection, vets import batches against it through a three-tier
//! duplicate checker, scores quality deterministically, and deletes
//! redundant files under a strict plan/validate/execute protocol.
//!
//! The [`db::Store`] owns all persistent state; [`core::Indexer`],
//! [`core::Vetter`], and [`core::DeletionEngine`] borrow it by injection
//! and hold nothing between calls.

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod utils;

pub use error::{Error, Result};
