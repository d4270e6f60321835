pub mod cli;
pub mod drive;
pub mod fetch;
pub mod load_config;
pub mod mail;

pub use cli::{run, Cli, Commands};
