use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Sink setup failed: {0}")]
    Sink(#[from] logstream_sinks::SinkError),

    #[error("Alert notifier setup failed: {0}")]
    Alert(#[from] logstream_alerting::AlertError),

    #[error("Flush scheduler requires a running tokio runtime")]
    NoRuntime,
}
