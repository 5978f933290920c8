//! Scripts for deploying and configuring the trading vault contracts.
//!
//! The [`orchestrator`] deploys the enabled contracts in dependency order through the
//! [`steps`] library, and the [`configurator`] issues the administrative transactions
//! that follow a deployment. Both reach the chain only through a [`chain::ChainClient`]
//! and report what they do to an [`events::EventSink`].

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod chain;
pub mod cli;
mod commands;
pub mod config;
pub mod configurator;
pub mod constants;
pub mod errors;
pub mod events;
pub mod orchestrator;
mod solidity;
pub mod steps;
pub mod types;
pub mod utils;
