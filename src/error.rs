use thiserror::Error;

/// Postmaster proxy application error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Application error: {message}")]
    Application { message: String },
}

impl Error {
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_error_display() {
        let error = Error::application("listener closed");
        assert_eq!(error.to_string(), "Application error: listener closed");
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "address in use",
            ))?;
            Ok(())
        }

        assert!(matches!(fails(), Err(Error::Io(_))));
    }
}
