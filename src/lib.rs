pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod diagnosis;
pub mod feedback;
pub mod llm;
pub mod session;
pub mod storage;
pub mod tools;
pub mod vision;
