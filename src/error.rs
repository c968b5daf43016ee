use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to discover local address: {0}")]
    Discovery(#[source] io::Error),

    #[error("failed to read {}: {source}", path.display())]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start https server: {0}")]
    Bind(Box<dyn std::error::Error + Send + Sync + 'static>),
}
