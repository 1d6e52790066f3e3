use thiserror::Error;

use crate::config::ConfigError;
use crate::session::SessionError;

/// Failures that stop the process before or while it starts consuming.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("could not set up request source or widget sink")]
    Session(#[from] SessionError),

    #[error("could not start metrics server")]
    Io(#[from] std::io::Error),
}
