//! Interfaces vers les collaborateurs externes du canal de contrôle.
//!
//! Le transport, l'allocateur de canaux radio, le récepteur GPS et l'horloge
//! ADC sont hors du périmètre de cette crate ; le routeur ne les atteint qu'à
//! travers ces traits.

use wrxsession::{ConnClass, SessionId};
use wrxutils::Locality;

/// Réceptacle des réponses d'une commande.
///
/// Le transport en fournit un par ligne de commande ; toutes les réponses
/// sont des lignes `MSG clé=valeur` préformatées.
pub trait ResponseSink {
    fn send(&mut self, line: String);
}

impl ResponseSink for Vec<String> {
    fn send(&mut self, line: String) {
        self.push(line);
    }
}

/// Compteurs de débit et d'occupation d'un canal radio
#[derive(Debug, Clone, Default)]
pub struct ThroughputStats {
    pub audio_kbps: f32,
    pub waterfall_kbps: f32,
    pub http_kbps: f32,
    /// Trames/s waterfall du canal demandé
    pub waterfall_fps: f32,
    /// Trames/s waterfall composites (tous canaux)
    pub waterfall_fps_composite: f32,
    pub audio_dropped: u32,
    pub pump_resets: u32,
    /// Histogramme d'occupation des tampons audio
    pub buffer_histogram: Vec<u32>,
}

/// Allocateur de canaux radio et pipeline DSP
pub trait ChannelAllocator: Send + Sync {
    /// Nombre de canaux actuellement libres
    fn free_channels(&self) -> usize;

    /// Compteurs du canal `ch` (`ch == rx_channels` pour le composite)
    fn throughput(&self, ch: usize) -> ThroughputStats;

    /// Active ou coupe la compression du flux waterfall d'un canal
    fn set_wf_compression(&self, ch: usize, enabled: bool);
}

/// État d'une voie de poursuite GPS
#[derive(Debug, Clone, Default)]
pub struct GpsChannelStatus {
    pub prn: i32,
    pub snr: i32,
    pub rssi: i32,
    pub gain: i32,
    pub hold: i32,
    pub wdog: i32,
    pub unlocked: u32,
    pub parity: u32,
    pub subframes: u32,
    pub subframes_renewed: u32,
    pub overflows: u32,
}

/// Position calculée quand un fix existe (degrés signés, altitude en mètres)
#[derive(Debug, Clone, Default)]
pub struct GpsPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

/// Instantané complet du récepteur GPS
#[derive(Debug, Clone, Default)]
pub struct GpsSnapshot {
    pub fft_ch: i32,
    pub acquiring: bool,
    pub tracking: u32,
    pub good: u32,
    pub fixes: u32,
    pub run_secs: u64,
    pub ttff_secs: Option<u32>,
    /// "Day HH:MM:SS", `None` tant qu'aucune heure GPS n'est connue
    pub gps_time: Option<String>,
    pub utc_offset_secs: Option<i32>,
    pub position: Option<GpsPosition>,
    pub channels: Vec<GpsChannelStatus>,
}

/// Récepteur GPS, lecture seule
pub trait GpsReceiver: Send + Sync {
    fn snapshot(&self) -> GpsSnapshot;
}

/// Correction d'horloge de l'ADC
pub trait ClockControl: Send + Sync {
    /// Fréquence nominale de l'horloge, en Hz
    fn nominal_hz(&self) -> f64;

    /// Fréquence corrigée courante, en MHz
    fn adc_clock_mhz(&self) -> f64;

    /// Nombre de corrections appliquées depuis le démarrage
    fn corrections(&self) -> u32;

    /// Ajustement manuel, en Hz (borné par le routeur avant appel)
    fn manual_adjust(&self, hz: i32);
}

/// Classification d'un pair par rapport au réseau local
pub trait LocalityResolver: Send + Sync {
    fn classify(&self, remote_ip: &str) -> Locality;
}

/// Implémentation de production : comparaison aux sous-réseaux attachés
pub struct SubnetLocality;

impl LocalityResolver for SubnetLocality {
    fn classify(&self, remote_ip: &str) -> Locality {
        wrxutils::classify_peer(remote_ip)
    }
}

/// Crochets d'intégration exécutés à la première authentification réussie
/// d'une session : envoi unique de la configuration au client et mise en
/// place du flux propre à la classe de connexion.
pub trait SessionHooks: Send + Sync {
    fn push_config(&self, _id: SessionId) {}
    fn setup(&self, _class: ConnClass, _id: SessionId) {}
}

/// Crochets inertes, pour les tests et les déploiements minimaux
pub struct NullHooks;

impl SessionHooks for NullHooks {}
