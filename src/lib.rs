//! Telegram bot that calls out conspiracy theories.
//!
//! Messages are stripped of command tokens, checked against an exclusion
//! list, embedded by an external sentence encoder and scored by a small
//! feed-forward head. Replies are composed from German template phrases.

pub mod classifier;
pub mod commands;
pub mod config;
pub mod context;
pub mod embedding;
pub mod generation;
pub mod handlers;
pub mod normalizer;
pub mod prefilter;
pub mod provider;
pub mod reply;

pub use classifier::{ClassifierError, ClassifierHead};
pub use config::Config;
pub use context::{BotContext, ProcessError};
