pub mod config;
pub mod logging;

pub mod control;
pub mod credentials;
pub mod error;
pub mod progress;
pub mod queue;
pub mod ranges;
pub mod remote;
pub mod retry;
pub mod session;
pub mod transfer;
pub mod uploader;
pub mod worker;
