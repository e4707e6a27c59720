pub mod cli;
pub mod commands;
pub mod config;
pub mod escalation;
pub mod executor;
pub mod inspector;
pub mod llm;
pub mod orchestration;
pub mod policy;
pub mod registry;
pub mod session;
pub mod shared;
