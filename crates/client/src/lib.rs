//! Interaction controller for a document Q&A client: staging and submitting files,
//! and a conversation whose answers are revealed with a typing effect.
#![deny(unsafe_code)]

pub mod chat;
pub mod settings;
mod telemetry;
pub mod upload;
pub mod view;

#[cfg(test)]
mod testing;

pub use telemetry::init_tracing;
