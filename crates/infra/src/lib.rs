//! Infrastructure layer: event stores, repositories, command routing,
//! projections and process wiring.

pub mod command_bus;
pub mod config;
pub mod event_store;
pub mod handlers;
pub mod projections;
pub mod read_model;
pub mod repository;
pub mod runtime;
pub mod workers;

#[cfg(test)]
mod integration_tests;
