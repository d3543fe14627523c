//! Tool-augmented market news digest agent.
//!
//! Pulls headlines from RSS feeds, hands them to a reasoning agent through
//! a single declared tool, formats the structured report, and delivers it
//! to a Telegram chat. Runs once per invocation; faults anywhere in the
//! pipeline surface as a sanitized error notification on the same channel.

pub mod agent;
pub mod config;
pub mod digest;
pub mod feeds;
pub mod report;
pub mod sanitize;
pub mod telegram;
pub mod tool;
