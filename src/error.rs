use std::fmt;

#[derive(Debug)]
pub enum StylefixError {
    InvalidConfiguration(String),
    Fetch { url: String, detail: String },
    Io(std::io::Error),
}

impl fmt::Display for StylefixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StylefixError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            StylefixError::Fetch { url, detail } => {
                write!(f, "fetch failed for {}: {}", url, detail)
            }
            StylefixError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for StylefixError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StylefixError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StylefixError {
    fn from(value: std::io::Error) -> Self {
        StylefixError::Io(value)
    }
}
