pub mod config;
pub mod exercise;
pub mod pose;
pub mod protocol;
pub mod session;
