//! services/api/src/lib.rs
//!
//! The mock exam service: adapters for the outside world, the generation
//! pipeline, and the HTTP layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod web;

#[cfg(test)]
mod tests;
