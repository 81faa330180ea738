//! VoicePC - natural-language desktop control
//!
//! This library turns short commands ("打开微信", "搜索 rust", "准备工作")
//! into desktop actions: an intent classifier, a registry of desktop tools,
//! scenes that chain tools, and an agent loop that runs either through an
//! LLM with function calling or through keyword rules.

pub mod adapters;
pub mod agent;
pub mod assistant;
pub mod config;
pub mod error;
pub mod intent;
pub mod session;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
