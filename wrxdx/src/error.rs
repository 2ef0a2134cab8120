//! Types d'erreurs pour wrxdx

/// Erreurs de la base de spots
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Spot group id {gid} out of range (store length {len})")]
    OutOfRange { gid: i64, len: usize },

    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// Type Result spécialisé pour wrxdx
pub type Result<T> = std::result::Result<T, Error>;
