use communique_store::StoreError;

/// Errors reported by the connection controller.
///
/// Collaborator failures arrive as `anyhow::Error` and are kept whole for
/// display.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("error retrieving password: {0:#}")]
    Credentials(anyhow::Error),

    #[error("error dialing connection: {0:#}")]
    Dial(anyhow::Error),

    #[error("error negotiating session: {0:#}")]
    Negotiate(anyhow::Error),

    #[error("error sending {what}: {err:#}")]
    Send {
        what: &'static str,
        err: anyhow::Error,
    },

    #[error("error fetching roster: {0:#}")]
    Roster(anyhow::Error),

    #[error("timed out {0}")]
    Timeout(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
