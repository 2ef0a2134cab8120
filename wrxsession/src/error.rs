//! Types d'erreurs pour wrxsession

/// Erreurs du registre de sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Session table is full ({0} slots)")]
    CapacityExhausted(usize),

    #[error("No valid session in slot {0}")]
    InvalidSession(usize),
}

/// Type Result spécialisé pour wrxsession
pub type Result<T> = std::result::Result<T, Error>;
