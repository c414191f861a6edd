#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server reported a machine-state label this build does not know.
    /// Usually a protocol or server-version mismatch.
    #[error("Unrecognized printer state: {0:?}")]
    UnrecognizedState(String),
}
