//! Infrastructure layer for build-a-bot.
//!
//! Contains implementations of the ports defined in `buildabot-core`:
//! the filesystem tree loader and `deployment.json` store, `variables.toml`
//! builders, `overlay.json` overlays, the ChatBotKit HTTP client, and the
//! config loader.

pub mod chatbotkit;
pub mod config;
pub mod filesystem;
pub mod overlay;
pub mod variables;
