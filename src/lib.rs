//! Secure form relay: accepts client-side encrypted contact-form
//! submissions and forwards them by email to an allow-listed team.

pub mod config;
pub mod error;
pub mod gateways;
pub mod relay;
pub mod security;
pub mod web;
pub mod workflow;
