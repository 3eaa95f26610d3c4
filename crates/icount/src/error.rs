use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("counter store: {0}")]
    Store(#[from] icount_state::StoreError),
    #[error("report: {0}")]
    Report(#[from] icount_report::ReportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid client options: {0}")]
    Options(#[from] clap::Error),
    #[error("missing collaborator callback: {0}")]
    MissingCallback(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
