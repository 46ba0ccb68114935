pub mod actions;
pub mod configs;
pub mod import;
