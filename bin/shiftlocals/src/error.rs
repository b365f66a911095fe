use classweave::jvm;
use std::fmt;
use std::io;

/// Ways injecting a fragment can go wrong
#[derive(Debug)]
pub enum CliError {
    Io(io::Error),

    /// Could not make sense of a line of the fragment
    Assembly { line: usize, message: String },

    /// Building the host method failed
    Jvm(jvm::Error),
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> CliError {
        CliError::Io(err)
    }
}

impl From<jvm::Error> for CliError {
    fn from(err: jvm::Error) -> CliError {
        CliError::Jvm(err)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(err) => write!(f, "IO - {}", err),
            CliError::Assembly { line, message } => write!(f, "line {} - {}", line, message),
            CliError::Jvm(err) => write!(f, "JVM - {}", err),
        }
    }
}

impl std::error::Error for CliError {}
