pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Occurs when `permtest.toml` fails to load.
    #[error("failed to load permtest.toml: {0}")]
    LoadError(String),
    /// Occurs when the specified key is not found in `permtest.toml`.
    #[error("the specified key \"{0}\" not found in permtest.toml")]
    ValueNotFound(String),
    /// Occurs when a configured value can not be parsed into the requested type.
    #[error("failed to parse value: {0}")]
    ValueError(eyre::Error),
    /// Another suite run is in progress in this process.
    #[error("other suite already running")]
    SuiteAlreadyRunning,
    /// The test case table of a module does not have an entry point for the descriptor.
    #[error("entry point \"{method}\" not found in module \"{module}\"")]
    EntryPointNotFound { module: String, method: String },
}
