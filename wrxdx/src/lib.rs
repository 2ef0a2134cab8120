//! # wrxdx - Base de données des spots de fréquence
//!
//! Collection ordonnée de marqueurs de fréquence ("spots") partagée par tous
//! les clients, mutée uniquement par le protocole privilégié du canal de
//! contrôle :
//!
//! - **Insertion** : l'entrée est mise en attente dans l'emplacement caché
//!   situé juste après la fin logique, puis un tri complet la place à sa
//!   position
//! - **Suppression** : la fréquence de l'entrée est forcée à une sentinelle
//!   qui trie en dernier, puis la longueur logique est décrémentée — jamais
//!   de décalage en place
//! - **Modification** : réécriture sur place puis re-tri
//!
//! Chaque mutation est persistée via la façade de configuration puis la copie
//! de travail est rechargée avant d'acquitter l'appelant. Toute la séquence
//! lecture-modification-persistance tient sous un seul verrou.
//!
//! La requête de plage (`markers`) est non privilégiée : fenêtre élargie d'une
//! marge de recherche fixe, avec éclaircissage des étiquettes aux niveaux de
//! zoom grossiers.

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{
    DELETED_FREQ, Marker, SEARCH_WINDOW_KHZ, SPACING_THRESHOLD_PX, SPACING_ZOOM_THRESHOLD, Spot,
    SpotStore, SpotUpdate,
};
