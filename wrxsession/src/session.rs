//! Enregistrement d'une connexion du canal de contrôle

use std::time::Instant;

/// Identifiant d'une session : son index dans la table du registre
pub type SessionId = usize;

/// Classe de connexion, fixée à l'ouverture par le transport.
///
/// La classe détermine quels rôles une session peut demander à
/// l'authentification et quels ordres privilégiés elle peut émettre
/// (`save_adm` exige la classe `Admin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnClass {
    /// Flux audio d'un récepteur
    Audio,
    /// Flux waterfall d'un récepteur
    Waterfall,
    /// Console d'administration
    Admin,
    /// Canal de management (maintenance usine)
    Mfg,
    /// Canal d'extension/plugin lié à un canal radio
    Ext,
}

impl ConnClass {
    /// Classe de flux récepteur (audio ou waterfall)
    pub fn is_stream(self) -> bool {
        matches!(self, ConnClass::Audio | ConnClass::Waterfall)
    }

    /// Console d'administration ou canal de management
    pub fn is_admin_or_mfg(self) -> bool {
        matches!(self, ConnClass::Admin | ConnClass::Mfg)
    }
}

/// État d'une connexion : identité, authentification, champs utilisateur.
///
/// Créée quand le transport accepte la connexion, peuplée par la première
/// commande `auth`, détruite quand le transport ferme. Les drapeaux `auth*`
/// ne sont posés que par la passerelle d'authentification et ne redescendent
/// jamais pendant la vie de la session.
#[derive(Debug)]
pub struct Session {
    pub class: ConnClass,
    pub remote_ip: String,
    /// Canal radio attribué par l'allocateur, `None` pour admin/mfg
    pub rx_channel: Option<usize>,
    /// Canal radio auquel une session d'extension est liée
    pub ext_rx_chan: Option<usize>,

    // État d'authentification
    pub auth: bool,
    pub auth_viewer: bool,
    pub auth_admin: bool,
    pub admin_demo_mode: bool,
    pub is_local: bool,
    pub keepalive_count: u32,

    // Champs utilisateur
    pub user: Option<String>,
    /// Nom dérivé de l'adresse IP faute d'identification explicite
    pub is_user_ip: bool,
    pub geo: Option<String>,
    pub pref_id: Option<String>,
    pub pref: Option<String>,
    pub inactivity_timeout_override: bool,

    // Renseigné par le chemin du signal, lu par l'annuaire GET_USERS
    pub arrived: bool,
    pub arrival: Instant,
    pub freq_hz: u32,
    pub mode: String,
    pub zoom: u8,
    pub ext_name: Option<String>,
    pub wf_compression: bool,

    // Compteurs d'erreurs cumulés par le chemin audio
    pub audio_underruns: u32,
    pub sequence_errors: u32,
}

impl Session {
    pub fn new(class: ConnClass, remote_ip: impl Into<String>) -> Self {
        Self {
            class,
            remote_ip: remote_ip.into(),
            rx_channel: None,
            ext_rx_chan: None,
            auth: false,
            auth_viewer: false,
            auth_admin: false,
            admin_demo_mode: false,
            is_local: false,
            keepalive_count: 0,
            user: None,
            is_user_ip: false,
            geo: None,
            pref_id: None,
            pref: None,
            inactivity_timeout_override: false,
            arrived: false,
            arrival: Instant::now(),
            freq_hz: 0,
            mode: String::new(),
            zoom: 0,
            ext_name: None,
            wf_compression: true,
            audio_underruns: 0,
            sequence_errors: 0,
        }
    }

    /// Canal effectif : canal radio attribué, ou canal lié pour une extension
    pub fn effective_channel(&self) -> Option<usize> {
        match self.class {
            ConnClass::Ext => self.ext_rx_chan,
            _ => self.rx_channel,
        }
    }
}
