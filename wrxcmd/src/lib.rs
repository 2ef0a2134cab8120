//! # wrxcmd - Interpréteur de commandes du canal de contrôle
//!
//! Cette crate est le cœur du protocole texte ligne-à-ligne que toutes les
//! connexions (audio, waterfall, console admin, canal de management,
//! extensions) utilisent pour s'authentifier puis échanger des commandes
//! d'état :
//!
//! - **CommandRouter** : analyse une ligne de commande, l'autorise contre
//!   l'état d'authentification de la session et la route vers le bon
//!   composant. Retourne un signal "reconnue / non reconnue" ; une commande
//!   inconnue n'est jamais une erreur de protocole.
//! - **AuthGate** : machine à états d'authentification avec des règles de
//!   confiance asymétriques par classe de connexion, propagation des droits
//!   admin entre sessions du même canal, et jeton superutilisateur à usage
//!   unique.
//! - **TelemetryAggregator** : instantané en lecture seule des compteurs par
//!   canal, de l'état GPS et de la correction d'horloge.
//!
//! Les systèmes hors périmètre (transport, allocateur de canaux, pipeline
//! DSP, récepteur GPS) sont atteints à travers les traits de
//! [`traits`].
//!
//! # Exemple
//!
//! ```no_run
//! use std::sync::Arc;
//! use wrxcmd::{CommandRouter, NullHooks, SubnetLocality};
//! # use wrxcmd::traits::*;
//! # fn collaborators() -> (Arc<dyn ChannelAllocator>, Arc<dyn GpsReceiver>, Arc<dyn ClockControl>) { unimplemented!() }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Arc::new(wrxconfig::Config::load("")?);
//! let registry = Arc::new(wrxsession::SessionRegistry::default());
//! let spots = Arc::new(wrxdx::SpotStore::new(config.clone())?);
//! let (allocator, gps, clock) = collaborators();
//!
//! let router = CommandRouter::new(
//!     config,
//!     registry.clone(),
//!     spots,
//!     allocator,
//!     gps,
//!     clock,
//!     Arc::new(SubnetLocality),
//!     Arc::new(NullHooks),
//! );
//!
//! let id = registry.open(wrxsession::ConnClass::Audio, "192.168.1.17")?;
//! let mut replies: Vec<String> = Vec::new();
//! router.handle(id, "SET auth t=kiwi", &mut replies).await;
//! # Ok(())
//! # }
//! ```

mod auth;
mod proto;
mod router;
mod stats;
pub mod traits;

pub use auth::AuthGate;
pub use router::CommandRouter;
pub use stats::TelemetryAggregator;
pub use traits::{
    ChannelAllocator, ClockControl, GpsChannelStatus, GpsPosition, GpsReceiver, GpsSnapshot,
    LocalityResolver, NullHooks, ResponseSink, SessionHooks, SubnetLocality, ThroughputStats,
};
pub use wrxutils::Locality;
