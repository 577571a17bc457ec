use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid date {value:?} in {table}.{column}")]
    InvalidDate {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("missing source table {0}")]
    MissingTable(String),

    #[error("failed to read {table}: {source}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
