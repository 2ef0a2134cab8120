//! SpotStore : collection triée et persistée des spots

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use wrxconfig::{Config, SpotRecord};

/// Fréquence sentinelle forçant une entrée supprimée à trier en dernier
pub const DELETED_FREQ: f64 = 999_999.0;

/// Marge de recherche (kHz) ajoutée de part et d'autre de la fenêtre : le
/// centre de la bande passante n'est pas connu ici
pub const SEARCH_WINDOW_KHZ: f64 = 10.0;

/// Niveau de zoom au-dessous duquel les étiquettes sont éclaircies
pub const SPACING_ZOOM_THRESHOLD: u8 = 5;

/// Distance minimale (pixels) entre deux étiquettes après éclaircissage
pub const SPACING_THRESHOLD_PX: i32 = 10;

/// Un marqueur de fréquence étiqueté.
///
/// `ident` et `notes` sont stockés tels que reçus, encodés en pourcent.
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    /// Porteuse, en kHz
    pub freq: f64,
    /// Décalage de sous-porteuse, en Hz
    pub offset: i32,
    pub flags: u32,
    pub ident: String,
    pub notes: String,
}

impl Spot {
    /// Fréquence effective : porteuse plus décalage
    pub fn effective_freq(&self) -> f64 {
        self.freq + self.offset as f64 / 1000.0
    }
}

/// Mutation demandée par le protocole `DX_UPD`.
///
/// Le routeur traduit la table d'actions du protocole (gid −1 = insertion,
/// fréquence sentinelle = suppression) vers ces variantes explicites.
#[derive(Debug, Clone)]
pub enum SpotUpdate {
    Insert {
        freq: f64,
        offset: i32,
        flags: u32,
        ident: String,
        notes: String,
    },
    Modify {
        gid: usize,
        freq: f64,
        offset: i32,
        flags: u32,
        ident: String,
        notes: String,
    },
    Delete {
        gid: usize,
    },
}

/// Entrée de la réponse `MKR`
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Index de l'entrée dans la collection triée complète
    pub gid: usize,
    /// Fréquence effective, kHz
    pub freq: f64,
    pub offset: i32,
    pub flags: u32,
    pub ident: String,
    pub notes: String,
}

/// Copie de travail : liste triée et longueur logique.
///
/// `list` peut porter un emplacement caché au-delà de `len` pendant une
/// insertion ; il n'est jamais visible d'une requête car toute la mutation
/// tient sous le verrou du magasin.
#[derive(Debug, Default)]
struct SpotList {
    list: Vec<Spot>,
    len: usize,
}

impl SpotList {
    fn sort(&mut self) {
        self.list.sort_by(|a, b| {
            a.effective_freq()
                .partial_cmp(&b.effective_freq())
                .unwrap_or(Ordering::Equal)
        });
    }
}

/// Base de spots partagée.
///
/// Un seul `Mutex` couvre la séquence complète mutation-tri-persistance-
/// rechargement : deux insertions concurrentes ne peuvent pas se disputer
/// l'emplacement caché, et aucune requête ne voit un état intermédiaire.
#[derive(Debug)]
pub struct SpotStore {
    config: Arc<Config>,
    inner: Mutex<SpotList>,
}

impl SpotStore {
    /// Charge la base depuis la façade de configuration
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let records = config.load_spots()?;
        let list: Vec<Spot> = records.into_iter().map(Spot::from).collect();
        let len = list.len();
        info!(spots = len, "spot database loaded");
        let mut inner = SpotList { list, len };
        inner.sort();
        Ok(Self {
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Longueur logique de la collection
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instantané trié de la collection (tests et rechargement client)
    pub fn snapshot(&self) -> Vec<Spot> {
        let inner = self.lock();
        inner.list[..inner.len].to_vec()
    }

    /// Applique une mutation, persiste, puis recharge la copie de travail.
    ///
    /// Le magasin n'acquitte jamais une mutation non persistée : en cas
    /// d'échec d'écriture, la copie de travail est rechargée depuis le
    /// dernier fichier valide et l'erreur remonte à l'appelant.
    pub fn update(&self, update: SpotUpdate) -> Result<()> {
        let mut inner = self.lock();

        let new_len = match update {
            SpotUpdate::Insert {
                freq,
                offset,
                flags,
                ident,
                notes,
            } => {
                // Emplacement caché juste après la fin logique ; le tri
                // placera l'entrée à sa position
                debug_assert_eq!(inner.list.len(), inner.len);
                inner.list.push(Spot {
                    freq,
                    offset,
                    flags,
                    ident,
                    notes,
                });
                inner.len += 1;
                inner.len
            }
            SpotUpdate::Modify {
                gid,
                freq,
                offset,
                flags,
                ident,
                notes,
            } => {
                if gid >= inner.len {
                    return Err(Error::OutOfRange {
                        gid: gid as i64,
                        len: inner.len,
                    });
                }
                inner.list[gid] = Spot {
                    freq,
                    offset,
                    flags,
                    ident,
                    notes,
                };
                inner.len
            }
            SpotUpdate::Delete { gid } => {
                if gid >= inner.len {
                    return Err(Error::OutOfRange {
                        gid: gid as i64,
                        len: inner.len,
                    });
                }
                // Suppression par tri vers la fin puis troncature
                inner.list[gid].freq = DELETED_FREQ;
                inner.list[gid].offset = 0;
                inner.len - 1
            }
        };

        inner.sort();
        inner.len = new_len;
        let len = inner.len;
        inner.list.truncate(len);

        // Persistance puis rechargement avant acquittement
        let records: Vec<SpotRecord> = inner.list.iter().map(SpotRecord::from).collect();
        if let Err(err) = self.config.save_spots(&records) {
            warn!(error = %err, "spot database save failed, reloading working copy");
            self.reload_locked(&mut inner);
            return Err(Error::Persist(err));
        }
        self.reload_locked(&mut inner);
        Ok(())
    }

    /// Requête de plage : sous-séquence ordonnée des spots dont la fréquence
    /// effective tombe dans `[min - marge, max + marge]`.
    ///
    /// Quand `zoom <= SPACING_ZOOM_THRESHOLD`, les étiquettes trop proches à
    /// l'écran sont éclaircies : la première entrée d'un groupe est gardée,
    /// les suivantes à moins de `SPACING_THRESHOLD_PX` pixels sont omises.
    pub fn markers(&self, min: f64, max: f64, zoom: u8, width: u32) -> Vec<Marker> {
        let inner = self.lock();
        let bw = max - min;
        let mut out = Vec::new();
        let mut last_x = 0i32;
        let mut first = true;

        for (gid, spot) in inner.list[..inner.len].iter().enumerate() {
            let freq = spot.effective_freq();
            if freq < min - SEARCH_WINDOW_KHZ {
                continue;
            }
            if freq > max + SEARCH_WINDOW_KHZ {
                // La liste est triée : rien au-delà
                break;
            }

            if zoom <= SPACING_ZOOM_THRESHOLD && bw > 0.0 {
                let x = ((spot.freq - min) / bw * width as f64) as i32;
                if !first && x - last_x < SPACING_THRESHOLD_PX {
                    continue;
                }
                last_x = x;
                first = false;
            }

            out.push(Marker {
                gid,
                freq,
                offset: spot.offset,
                flags: spot.flags,
                ident: spot.ident.clone(),
                notes: spot.notes.clone(),
            });
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpotList> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reload_locked(&self, inner: &mut SpotList) {
        match self.config.load_spots() {
            Ok(records) => {
                inner.list = records.into_iter().map(Spot::from).collect();
                inner.len = inner.list.len();
                inner.sort();
            }
            Err(err) => {
                warn!(error = %err, "spot database reload failed, keeping in-memory copy");
            }
        }
    }
}

impl From<SpotRecord> for Spot {
    fn from(r: SpotRecord) -> Self {
        Spot {
            freq: r.freq,
            offset: r.offset,
            flags: r.flags,
            ident: r.ident,
            notes: r.notes,
        }
    }
}

impl From<&Spot> for SpotRecord {
    fn from(s: &Spot) -> Self {
        SpotRecord {
            freq: s.freq,
            offset: s.offset,
            flags: s.flags,
            ident: s.ident.clone(),
            notes: s.notes.clone(),
        }
    }
}
