pub mod completions;
pub mod config;
pub mod exercise;
pub mod journal;
pub mod play;
pub mod session;
