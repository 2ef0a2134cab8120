//! Passerelle d'authentification du canal de contrôle.
//!
//! Machine à états par session : `UNAUTHENTICATED → {VIEWER, ADMIN,
//! VIEWER+ADMIN}` ; aucune commande ne rétrograde une session. Les règles de
//! confiance sont asymétriques par classe de connexion et le résultat est
//! toujours l'un des trois codes `badp` : 0 accordé, 1 refusé,
//! 2 indéterminable.

use crate::proto::{decode, kv_tokens, send_msg};
use crate::traits::{ChannelAllocator, LocalityResolver, ResponseSink, SessionHooks};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use wrxconfig::Config;
use wrxsession::{ConnClass, SessionId, SessionRegistry};
use wrxutils::Locality;

/// Résultat d'une tentative d'authentification, valeur du code `badp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Allowed = 0,
    Rejected = 1,
    Indeterminate = 2,
}

/// Passerelle d'authentification.
///
/// Seul composant autorisé à poser les drapeaux viewer/admin d'une session.
/// Le jeton superutilisateur est un état mutable à l'échelle du processus :
/// son test-et-effacement est un unique `swap` atomique, il ne peut donc
/// jamais rester armé au travers de deux tentatives.
pub struct AuthGate {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    allocator: Arc<dyn ChannelAllocator>,
    locality: Arc<dyn LocalityResolver>,
    hooks: Arc<dyn SessionHooks>,
    su_override: AtomicBool,
}

impl AuthGate {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        allocator: Arc<dyn ChannelAllocator>,
        locality: Arc<dyn LocalityResolver>,
        hooks: Arc<dyn SessionHooks>,
    ) -> Self {
        Self {
            config,
            registry,
            allocator,
            locality,
            hooks,
            su_override: AtomicBool::new(false),
        }
    }

    /// Arme le jeton superutilisateur à usage unique.
    ///
    /// Réservé à un appelant de confiance hors bande (console locale,
    /// procédure de récupération). Le jeton force l'acceptation de la
    /// prochaine tentative, quelle qu'elle soit, et est consommé aussitôt.
    pub fn arm_superuser(&self) {
        self.su_override.store(true, Ordering::SeqCst);
    }

    /// Traite `SET auth t=<kiwi|admin> p=<password>`.
    ///
    /// Seule commande admise avant authentification (avec le keepalive).
    /// Les échecs de forme ou de compatibilité de classe répondent le code
    /// générique `badp=1` sans révéler quelle vérification a échoué.
    pub(crate) fn authenticate(&self, id: SessionId, args: &str, sink: &mut dyn ResponseSink) {
        let mut role = None;
        let mut password = None;
        for (k, v) in kv_tokens(args) {
            match k {
                "t" => role = Some(v),
                "p" => password = Some(decode(v)),
                _ => {}
            }
        }

        let Ok((class, remote_ip)) = self
            .registry
            .with_session(id, |s| (s.class, s.remote_ip.clone()))
        else {
            warn!(session = id, "auth request on closed session");
            return;
        };

        let Some(role) = role else {
            warn!(remote = %remote_ip, "auth request without role");
            send_msg(sink, "badp", AuthOutcome::Rejected as u8);
            return;
        };

        let type_viewer = role == "kiwi";
        let type_admin = role == "admin";
        if !type_viewer && !type_admin {
            warn!(remote = %remote_ip, role, ?class, "auth request with unknown role");
            send_msg(sink, "badp", AuthOutcome::Rejected as u8);
            return;
        }

        // Console admin/mfg ouverte, puis rôle viewer demandé : mélange de types
        if class.is_admin_or_mfg() && !type_admin {
            warn!(remote = %remote_ip, role, ?class, "auth role incompatible with connection class");
            send_msg(sink, "badp", AuthOutcome::Rejected as u8);
            return;
        }

        let locality = self.locality.classify(&remote_ip);
        let is_local = locality == Locality::IsLocal;

        // Dire au client qui nous pensons qu'il est. Un pair du sous-réseau
        // local reçoit l'adresse publique du serveur, pour que sa
        // géolocalisation côté client soit la même quel que soit le point de vue.
        let client_public_ip = if is_local {
            self.config.get_public_ip()
        } else {
            remote_ip.clone()
        };
        send_msg(sink, "client_public_ip", &client_public_ip);

        let rx_chans = self.config.get_rx_channels();
        let chan_no_pwd = self.config.get_chan_no_pwd();
        let chan_need_pwd = rx_chans.saturating_sub(chan_no_pwd);

        let mut allow = false;
        let mut cant_determine = false;
        let cfg_pwd;

        if type_viewer {
            cfg_pwd = self.config.get_user_password();
            let auto_login = self.config.get_user_auto_login();

            if cfg_pwd.is_none() {
                // Pas de mot de passe viewer configuré : accès libre
                allow = true;
            } else if auto_login && is_local {
                allow = true;
            } else if self.allocator.free_channels() >= chan_need_pwd {
                // Contrôle d'accès adaptatif à la capacité : tant que la
                // réserve sans mot de passe n'est pas entamée, on laisse entrer
                allow = true;
            }
        } else {
            cfg_pwd = self.config.get_admin_password();
            let auto_login = self.config.get_admin_auto_login();
            info!(remote = %remote_ip, role, pwd_set = cfg_pwd.is_some(), auto_login, "admin auth attempt");

            if cfg_pwd.is_none() && locality == Locality::CannotDetermine {
                // Statut local inconnaissable (pas encore d'information de
                // routage) : code distinct, l'appelant peut réessayer
                cant_determine = true;
            } else if cfg_pwd.is_none() && is_local {
                // Pas de mot de passe admin (installation initiale) : accès
                // depuis le réseau local seulement
                allow = true;
            } else if auto_login && is_local {
                allow = true;
            }
        }

        // Jeton superutilisateur : consommé en un seul pas atomique, quelle
        // que soit l'issue de la tentative
        if self.su_override.swap(false, Ordering::SeqCst) {
            info!(remote = %remote_ip, role, "auth allowed by superuser override");
            allow = true;
        }

        let outcome = if cant_determine {
            AuthOutcome::Indeterminate
        } else if allow {
            AuthOutcome::Allowed
        } else {
            match (&cfg_pwd, &password) {
                (Some(cfg), Some(given)) if cfg.eq_ignore_ascii_case(given) => {
                    AuthOutcome::Allowed
                }
                _ => AuthOutcome::Rejected,
            }
        };

        send_msg(sink, "rx_chans", rx_chans);
        send_msg(sink, "chan_no_pwd", chan_no_pwd);
        send_msg(sink, "badp", outcome as u8);

        match outcome {
            AuthOutcome::Allowed => self.grant(id, class, type_admin, is_local),
            AuthOutcome::Rejected => {
                warn!(remote = %remote_ip, role, "auth rejected");
            }
            AuthOutcome::Indeterminate => {
                warn!(remote = %remote_ip, role, "auth indeterminate, peer may retry");
            }
        }
    }

    /// Pose les drapeaux sur la session et déroule les suites d'un succès :
    /// propagation admin au canal, puis envoi unique de la configuration et
    /// crochet de mise en place à la première authentification.
    fn grant(&self, id: SessionId, class: ConnClass, type_admin: bool, is_local: bool) {
        let Ok((demo, first_auth, channel)) = self.registry.with_session_mut(id, |s| {
            let demo = s.admin_demo_mode;

            // Les deux drapeaux peuvent coexister : auth viewer à la
            // connexion, puis mot de passe admin donné plus tard pour
            // éditer les spots
            if !type_admin || demo {
                s.auth_viewer = true;
            }
            if type_admin && !demo {
                s.auth_admin = true;
            }

            let first_auth = !s.auth;
            if first_auth {
                s.auth = true;
                s.is_local = is_local;
            }
            (demo, first_auth, s.effective_channel())
        }) else {
            return;
        };

        // Droits admin accordés à ce qui a commencé comme une session
        // viewer : le contrôle admin d'un canal s'étend à toutes les vues de
        // ce canal, pas seulement à celle qui a tapé le mot de passe
        if type_admin && !demo && !class.is_admin_or_mfg() {
            if let Some(channel) = channel {
                let granted = self.registry.propagate_admin(channel);
                info!(channel, granted, "admin rights extended to channel sessions");
            }
        }

        if first_auth {
            // Configuration poussée une seule fois vers le client
            if class == ConnClass::Audio || class.is_admin_or_mfg() {
                self.hooks.push_config(id);
            }
            self.hooks.setup(class, id);
        }
    }
}
