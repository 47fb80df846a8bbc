//! HTTP surface of the alert receiver
//!
//! Accepts alert webhooks on `/webhook` and exposes `/status` and `/health`
//! for operators and container probes.

pub mod handlers;
