//! CLI command implementations

pub mod app;
pub mod conversations;
pub mod init;
pub mod talk;
