use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no {0} gateway configured")]
    GatewayNotConfigured(&'static str),

    #[error("notifier failed: {0}")]
    Notifier(String),
}
