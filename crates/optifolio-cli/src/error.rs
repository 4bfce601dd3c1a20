//! CLI error types and process exit codes.

use std::path::PathBuf;

use optifolio_portfolio::{ErrorKind, PortfolioError};
use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be opened or read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A CSV file is malformed.
    #[error("Invalid CSV in {path}: {message}")]
    Csv {
        /// File being parsed.
        path: PathBuf,
        /// What went wrong, with the line when known.
        message: String,
    },

    /// A config file could not be parsed.
    #[error("Configuration error in {path}: {message}")]
    Config {
        /// Config file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Invalid argument value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

/// Exit code for usage and input errors.
pub const EXIT_USAGE: u8 = 2;

/// Exit code for anything not otherwise classified.
pub const EXIT_OTHER: u8 = 1;

/// Stable exit code for each engine error kind.
pub fn kind_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InsufficientData => 10,
        ErrorKind::NonFiniteInput => 11,
        ErrorKind::UnknownAsset => 20,
        ErrorKind::UnknownClass => 21,
        ErrorKind::EmptyClass => 22,
        ErrorKind::InfeasibleConstraints => 30,
        ErrorKind::SingularCovariance => 31,
        ErrorKind::ConvergenceFailure => 32,
        ErrorKind::InvalidInput => 40,
    }
}

/// Exit code for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(engine) = cause.downcast_ref::<PortfolioError>() {
            return kind_code(engine.kind());
        }
        if cause.downcast_ref::<CliError>().is_some() {
            return EXIT_USAGE;
        }
    }
    EXIT_OTHER
}
