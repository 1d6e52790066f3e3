pub mod build_info;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod request;
pub mod server;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;
pub mod transcoder;

pub use error::Error;
