//! Chat Gate — a chat front-end that answers through a hosted model and
//! turns trigger phrases into confirm-before-send emails.

pub mod agent;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gate;
pub mod llm;
pub mod mail;
