use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("endpoint rejected {rejected} of {total} entries")]
    Rejected { rejected: usize, total: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink panicked while writing")]
    Panicked,
}
