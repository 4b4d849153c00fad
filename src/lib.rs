//! # Crisp WebHooks Library
//!
//! This library provides the admission pipeline for incoming Crisp WebHook
//! notifications: routing, shared-secret verification, body binding, and
//! server configuration.

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod receivers;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub mod transport;
pub mod webhook_verification;
