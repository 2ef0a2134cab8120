/// Utilitaires réseau pour WRXServer.
///
/// Ce module fournit les fonctions de détection d'adresses IP locales et de
/// classification des pairs par rapport aux sous-réseaux directement attachés.
///
/// # Fonctions principales
///
/// - [`guess_local_ip`] : Devine l'adresse IP locale utilisée pour les connexions sortantes
/// - [`classify_peer`] : Classe un pair comme local, non-local ou indéterminable
mod ip_utils;

pub use ip_utils::{Locality, classify_peer, guess_local_ip};
