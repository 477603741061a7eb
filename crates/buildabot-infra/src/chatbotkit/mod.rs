//! ChatBotKit hosting-service client.

pub mod client;
pub mod types;

pub use client::ChatBotKitClient;
