pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod logs;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod reconcile;
pub mod store;

pub use error::{Result, TfgateError};
