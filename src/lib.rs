pub mod catalog;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod infra;
pub mod output;
pub mod parser;
pub mod publish;
pub mod services;
pub mod session;
