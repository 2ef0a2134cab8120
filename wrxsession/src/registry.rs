//! SessionRegistry : table à capacité fixe des connexions

use crate::error::{Error, Result};
use crate::session::{ConnClass, Session, SessionId};
use std::sync::RwLock;
use tracing::{debug, info};

/// Entrée de l'annuaire des utilisateurs, un canal radio occupé.
///
/// Instantané en lecture seule pris sous le verrou du registre ; le rendu
/// JSON (et l'encodage des champs libres) appartient au routeur de commandes.
#[derive(Debug, Clone)]
pub struct UserEntry {
    pub channel: usize,
    /// `None` quand le nom est dérivé de l'adresse IP
    pub user: Option<String>,
    pub geo: Option<String>,
    pub freq_hz: u32,
    pub mode: String,
    pub zoom: u8,
    pub connected_secs: u64,
    pub ext_name: Option<String>,
    pub remote_ip: String,
}

/// Résultat d'un import de préférence
#[derive(Debug, Clone, PartialEq)]
pub struct PrefMatch {
    pub channel: Option<usize>,
    pub pref: String,
}

/// Table de toutes les connexions, à capacité fixe.
///
/// Le registre est le propriétaire exclusif des enregistrements [`Session`].
/// Un unique `RwLock` protège la table entière : les opérations qui lisent ou
/// modifient plusieurs sessions à la fois (propagation admin, échange de
/// préférences, annuaire, compteurs de télémétrie) s'exécutent sous ce verrou
/// et ne peuvent donc pas croiser un démontage de session.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: RwLock<Vec<Option<Session>>>,
}

impl SessionRegistry {
    /// Crée un registre avec `capacity` emplacements
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Ouvre une session dans le premier emplacement libre
    pub fn open(&self, class: ConnClass, remote_ip: impl Into<String>) -> Result<SessionId> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let capacity = slots.len();
        for (id, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Session::new(class, remote_ip));
                debug!(session = id, ?class, "session opened");
                return Ok(id);
            }
        }
        Err(Error::CapacityExhausted(capacity))
    }

    /// Ferme une session et libère son emplacement
    pub fn close(&self, id: SessionId) -> Result<()> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(id) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                debug!(session = id, "session closed");
                Ok(())
            }
            _ => Err(Error::InvalidSession(id)),
        }
    }

    /// Accès en lecture à une session
    pub fn with_session<R>(&self, id: SessionId, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        match slots.get(id).and_then(|s| s.as_ref()) {
            Some(session) => Ok(f(session)),
            None => Err(Error::InvalidSession(id)),
        }
    }

    /// Accès en écriture à une session
    pub fn with_session_mut<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(id).and_then(|s| s.as_mut()) {
            Some(session) => Ok(f(session)),
            None => Err(Error::InvalidSession(id)),
        }
    }

    /// Nombre de sessions ouvertes
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacité de la table
    pub fn capacity(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.len()
    }

    /// Étend les droits admin à toutes les sessions vues du canal `channel`.
    ///
    /// Cible les sessions audio/waterfall attribuées au canal et les sessions
    /// d'extension qui y sont liées ; les sessions d'autres canaux et les
    /// consoles admin/mfg ne sont pas touchées. Toute la passe s'exécute sous
    /// le verrou en écriture du registre.
    ///
    /// Retourne le nombre de sessions ayant reçu le droit.
    pub fn propagate_admin(&self, channel: usize) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let mut granted = 0;
        for (id, slot) in slots.iter_mut().enumerate() {
            let Some(session) = slot.as_mut() else {
                continue;
            };
            if !(session.class.is_stream() || session.class == ConnClass::Ext) {
                continue;
            }
            if session.effective_channel() == Some(channel) && !session.auth_admin {
                session.auth_admin = true;
                granted += 1;
                info!(session = id, channel, "admin rights propagated");
            }
        }
        granted
    }

    /// Exporte une préférence sur la session appelante.
    ///
    /// Dernier écrivain gagne sur tout le registre : le même `pref_id` est
    /// d'abord retiré de toutes les autres sessions.
    pub fn export_pref(&self, id: SessionId, pref_id: String, pref: String) -> Result<()> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.get(id).map(|s| s.is_none()).unwrap_or(true) {
            return Err(Error::InvalidSession(id));
        }

        for (other_id, slot) in slots.iter_mut().enumerate() {
            if other_id == id {
                continue;
            }
            let Some(other) = slot.as_mut() else { continue };
            if other.pref_id.as_deref() == Some(pref_id.as_str()) && other.pref.is_some() {
                other.pref_id = None;
                other.pref = None;
            }
        }

        let session = slots[id].as_mut().ok_or(Error::InvalidSession(id))?;
        session.pref_id = Some(pref_id);
        session.pref = Some(pref);
        Ok(())
    }

    /// Recherche une préférence exportée par n'importe quelle session.
    ///
    /// L'auto-correspondance est permise : une session peut réimporter sa
    /// propre préférence.
    pub fn import_pref(&self, pref_id: &str) -> Option<PrefMatch> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        for slot in slots.iter() {
            let Some(session) = slot.as_ref() else {
                continue;
            };
            if session.pref_id.as_deref() == Some(pref_id) {
                if let Some(pref) = &session.pref {
                    return Some(PrefMatch {
                        channel: session.rx_channel,
                        pref: pref.clone(),
                    });
                }
            }
        }
        None
    }

    /// Instantané de l'annuaire : une entrée par session audio arrivée.
    ///
    /// Parcours en lecture seule ; aucune session n'est modifiée.
    pub fn user_list_snapshot(&self) -> Vec<UserEntry> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let mut entries = Vec::new();
        for slot in slots.iter() {
            let Some(session) = slot.as_ref() else {
                continue;
            };
            if session.class != ConnClass::Audio || !session.arrived || session.user.is_none() {
                continue;
            }
            let Some(channel) = session.rx_channel else {
                continue;
            };
            entries.push(UserEntry {
                channel,
                user: if session.is_user_ip {
                    None
                } else {
                    session.user.clone()
                },
                geo: session.geo.clone(),
                freq_hz: session.freq_hz,
                mode: session.mode.clone(),
                zoom: session.zoom,
                connected_secs: session.arrival.elapsed().as_secs(),
                ext_name: session.ext_name.clone(),
                remote_ip: session.remote_ip.clone(),
            });
        }
        entries
    }

    /// Compteurs d'erreurs cumulés sur les sessions audio arrivées
    pub fn error_counters(&self) -> (u64, u64) {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let mut underruns = 0u64;
        let mut seq_errors = 0u64;
        for slot in slots.iter() {
            let Some(session) = slot.as_ref() else {
                continue;
            };
            if session.class == ConnClass::Audio && session.arrived {
                underruns += session.audio_underruns as u64;
                seq_errors += session.sequence_errors as u64;
            }
        }
        (underruns, seq_errors)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(crate::MAX_SESSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_on_channel(reg: &SessionRegistry, class: ConnClass, chan: usize) -> SessionId {
        let id = reg.open(class, "10.0.0.2").unwrap();
        reg.with_session_mut(id, |s| match class {
            ConnClass::Ext => s.ext_rx_chan = Some(chan),
            _ => s.rx_channel = Some(chan),
        })
        .unwrap();
        id
    }

    #[test]
    fn test_capacity_exhausted() {
        let reg = SessionRegistry::new(2);
        assert!(reg.is_empty());
        assert_eq!(reg.capacity(), 2);

        reg.open(ConnClass::Audio, "1.1.1.1").unwrap();
        reg.open(ConnClass::Audio, "2.2.2.2").unwrap();
        assert_eq!(reg.len(), 2);
        assert!(matches!(
            reg.open(ConnClass::Audio, "3.3.3.3"),
            Err(Error::CapacityExhausted(2))
        ));
    }

    #[test]
    fn test_close_frees_slot() {
        let reg = SessionRegistry::new(1);
        let id = reg.open(ConnClass::Audio, "1.1.1.1").unwrap();
        reg.close(id).unwrap();
        assert!(reg.is_empty());
        assert!(reg.open(ConnClass::Waterfall, "2.2.2.2").is_ok());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_propagate_admin_same_channel_only() {
        let reg = SessionRegistry::default();
        let snd = open_on_channel(&reg, ConnClass::Audio, 1);
        let wf = open_on_channel(&reg, ConnClass::Waterfall, 1);
        let ext = open_on_channel(&reg, ConnClass::Ext, 1);
        let other = open_on_channel(&reg, ConnClass::Audio, 2);
        let adm = reg.open(ConnClass::Admin, "10.0.0.9").unwrap();

        let granted = reg.propagate_admin(1);
        assert_eq!(granted, 3);

        for id in [snd, wf, ext] {
            assert!(reg.with_session(id, |s| s.auth_admin).unwrap());
        }
        assert!(!reg.with_session(other, |s| s.auth_admin).unwrap());
        assert!(!reg.with_session(adm, |s| s.auth_admin).unwrap());
    }

    #[test]
    fn test_pref_export_last_writer_wins() {
        let reg = SessionRegistry::default();
        let a = open_on_channel(&reg, ConnClass::Audio, 0);
        let b = open_on_channel(&reg, ConnClass::Audio, 1);

        reg.export_pref(a, "waterfall.colors".into(), "blob-a".into())
            .unwrap();
        reg.export_pref(b, "waterfall.colors".into(), "blob-b".into())
            .unwrap();

        // Le premier export a été retiré par le second
        assert!(reg.with_session(a, |s| s.pref.is_none()).unwrap());
        let found = reg.import_pref("waterfall.colors").unwrap();
        assert_eq!(found.pref, "blob-b");
        assert_eq!(found.channel, Some(1));
    }

    #[test]
    fn test_pref_import_not_found() {
        let reg = SessionRegistry::default();
        open_on_channel(&reg, ConnClass::Audio, 0);
        assert!(reg.import_pref("unknown.id").is_none());
    }

    #[test]
    fn test_pref_self_import_allowed() {
        let reg = SessionRegistry::default();
        let a = open_on_channel(&reg, ConnClass::Audio, 3);
        reg.export_pref(a, "agc".into(), "fast".into()).unwrap();

        let found = reg.import_pref("agc").unwrap();
        assert_eq!(found.channel, Some(3));
        assert_eq!(found.pref, "fast");
    }

    #[test]
    fn test_user_list_snapshot_filters() {
        let reg = SessionRegistry::default();
        let a = open_on_channel(&reg, ConnClass::Audio, 0);
        reg.with_session_mut(a, |s| {
            s.arrived = true;
            s.user = Some("F4ABC".into());
            s.freq_hz = 7_030_000;
        })
        .unwrap();
        // Session audio non arrivée : invisible
        open_on_channel(&reg, ConnClass::Audio, 1);

        let list = reg.user_list_snapshot();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].channel, 0);
        assert_eq!(list[0].user.as_deref(), Some("F4ABC"));
    }

    #[test]
    fn test_error_counters_sum() {
        let reg = SessionRegistry::default();
        for (chan, under, seq) in [(0usize, 3u32, 1u32), (1, 2, 0)] {
            let id = open_on_channel(&reg, ConnClass::Audio, chan);
            reg.with_session_mut(id, |s| {
                s.arrived = true;
                s.user = Some("x".into());
                s.audio_underruns = under;
                s.sequence_errors = seq;
            })
            .unwrap();
        }
        assert_eq!(reg.error_counters(), (5, 1));
    }
}
