use std::fmt;

#[derive(Debug)]
pub enum CarnetPressError {
    InvalidConfiguration(String),
    FontUnavailable(String),
    Asset(String),
    Raster(String),
    Assembly(String),
    Io(std::io::Error),
}

impl fmt::Display for CarnetPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarnetPressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            CarnetPressError::FontUnavailable(family) => {
                write!(f, "font family not available: {}", family)
            }
            CarnetPressError::Asset(message) => write!(f, "asset error: {}", message),
            CarnetPressError::Raster(message) => write!(f, "raster error: {}", message),
            CarnetPressError::Assembly(message) => write!(f, "pdf assembly error: {}", message),
            CarnetPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CarnetPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CarnetPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CarnetPressError {
    fn from(value: std::io::Error) -> Self {
        CarnetPressError::Io(value)
    }
}
