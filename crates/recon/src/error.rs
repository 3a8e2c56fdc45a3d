use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty name, bad sentinel, etc.).
    ConfigValidation(String),
    /// A whole input could not be decoded (not JSON, unreadable CSV header).
    Decode { source: String, message: String },
    /// Writing an export failed.
    Export(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Decode { source, message } => {
                write!(f, "cannot decode {source}: {message}")
            }
            Self::Export(msg) => write!(f, "export error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<std::io::Error> for ReconError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
