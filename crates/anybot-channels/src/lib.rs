//! Chat transports for anybot
//!
//! This crate provides the event bus and the Slack adapter: Socket Mode for
//! inbound events and the Web API for everything sent back.

pub mod bus;
pub mod slack;

pub use bus::{EventBus, EventSource};
pub use slack::{SlackApiClient, SlackChannel};
