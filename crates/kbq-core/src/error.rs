use thiserror::Error;

/// Failure taxonomy shared by every kbq crate.
///
/// `Config`, `Connection` and `IndexLoad` are fatal when they happen while a
/// service is being constructed. `Embedding` and `Retrieval` are scoped to a
/// single query and never change service state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("index load error: {0}")]
    IndexLoad(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self { Error::Config(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
