//! # wrxsession - Registre des connexions du canal de contrôle
//!
//! Cette crate fournit la table à capacité fixe de toutes les connexions du
//! serveur et les opérations qui traversent plusieurs sessions :
//!
//! - **SessionRegistry** : propriétaire exclusif de tous les enregistrements
//!   [`Session`], un seul verrou pour toute la table
//! - **Propagation admin** : extension des droits admin à toutes les sessions
//!   liées au même canal radio
//! - **Échange de préférences** : export/import de blobs opaques entre
//!   sessions (dernier écrivain gagne, portée registre entier)
//! - **Parcours en lecture seule** : instantanés pour l'annuaire des
//!   utilisateurs et l'agrégation de télémétrie
//!
//! L'état d'authentification d'une session est monotone : aucune opération du
//! registre ne retire un droit acquis tant que la session est ouverte.

mod error;
mod registry;
mod session;

pub use error::{Error, Result};
pub use registry::{PrefMatch, SessionRegistry, UserEntry};
pub use session::{ConnClass, Session, SessionId};

/// Capacité par défaut de la table des connexions
pub const MAX_SESSIONS: usize = 16;
