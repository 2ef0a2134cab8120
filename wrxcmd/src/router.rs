//! Routeur de commandes : analyse, autorisation et distribution d'une ligne
//! du canal de contrôle.

use crate::auth::AuthGate;
use crate::proto::{decode, encode, kv_tokens, send_msg, send_msg_encoded};
use crate::stats::TelemetryAggregator;
use crate::traits::{
    ChannelAllocator, ClockControl, GpsReceiver, LocalityResolver, ResponseSink, SessionHooks,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use wrxconfig::Config;
use wrxdx::{SpotStore, SpotUpdate};
use wrxsession::{ConnClass, SessionId, SessionRegistry};

const ASCII_ETX: u8 = 0x03;

/// Bascules réservées au débogage, état du processus
#[derive(Debug, Default)]
struct DebugFlags {
    nocache: bool,
    ctrace: bool,
    debug_v: i32,
}

/// Distributeur de plus haut niveau du canal de contrôle.
///
/// Le transport livre une ligne de commande et un identifiant de session ;
/// le routeur traite lui-même l'amorçage d'authentification puis, une fois
/// la session authentifiée, route vers la passerelle d'authentification, la
/// base de spots, l'agrégateur de télémétrie ou les simples attributs de
/// session. Toutes les réponses repartent par le [`ResponseSink`] fourni.
pub struct CommandRouter {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    spots: Arc<SpotStore>,
    allocator: Arc<dyn ChannelAllocator>,
    clock: Arc<dyn ClockControl>,
    gate: AuthGate,
    telemetry: TelemetryAggregator,
    current_authkey: Mutex<Option<String>>,
    debug: Mutex<DebugFlags>,
}

impl CommandRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        spots: Arc<SpotStore>,
        allocator: Arc<dyn ChannelAllocator>,
        gps: Arc<dyn GpsReceiver>,
        clock: Arc<dyn ClockControl>,
        locality: Arc<dyn LocalityResolver>,
        hooks: Arc<dyn SessionHooks>,
    ) -> Self {
        let gate = AuthGate::new(
            config.clone(),
            registry.clone(),
            allocator.clone(),
            locality,
            hooks,
        );
        let telemetry = TelemetryAggregator::new(
            config.clone(),
            registry.clone(),
            allocator.clone(),
            gps,
            clock.clone(),
        );
        Self {
            config,
            registry,
            spots,
            allocator,
            clock,
            gate,
            telemetry,
            current_authkey: Mutex::new(None),
            debug: Mutex::new(DebugFlags::default()),
        }
    }

    /// Passerelle d'authentification, pour l'armement hors bande du jeton
    /// superutilisateur
    pub fn auth_gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Traite une ligne de commande pour la session `id`.
    ///
    /// Retourne `true` si la commande a été reconnue (même si elle a été
    /// rejetée ou ignorée), `false` sinon : une commande inconnue n'est
    /// jamais une erreur de protocole, l'appelant applique son propre
    /// traitement de repli.
    pub async fn handle(&self, id: SessionId, line: &str, sink: &mut dyn ResponseSink) -> bool {
        // Point d'équité : borne la monopolisation de l'ordonnanceur par de
        // longues rafales de commandes d'une même session
        tokio::task::yield_now().await;

        // SÉCURITÉ : seule commande admise avant la vérification
        // d'authentification ci-dessous. Une requête sans paramètre passe
        // aussi par la passerelle, qui répond le rejet générique.
        if let Some(rest) = line.strip_prefix("SET auth") {
            if rest.is_empty() || rest.starts_with(' ') {
                self.gate.authenticate(id, rest.trim_start(), sink);
                return true;
            }
        }

        if line == "SET keepalive" {
            let _ = self.registry.with_session_mut(id, |s| s.keepalive_count += 1);
            return true;
        }

        let Ok((auth, class, remote_ip)) = self
            .registry
            .with_session(id, |s| (s.auth, s.class, s.remote_ip.clone()))
        else {
            warn!(session = id, cmd = line, "command on closed session");
            return true;
        };

        // SÉCURITÉ : aucune autre commande n'est acceptée avant
        // authentification ; on prétend l'avoir traitée pour que le pair ne
        // voie pas d'erreur et que la boucle de lecture avance
        if !auth {
            warn!(remote = %remote_ip, ?class, cmd = line, "command before authentication, ignored");
            return true;
        }

        self.dispatch(id, class, &remote_ip, line, sink)
    }

    fn dispatch(
        &self,
        id: SessionId,
        class: ConnClass,
        remote_ip: &str,
        line: &str,
        sink: &mut dyn ResponseSink,
    ) -> bool {
        if line == "SET is_admin" {
            let is_admin = self
                .registry
                .with_session(id, |s| s.auth_admin)
                .unwrap_or(false);
            send_msg(sink, "is_admin", is_admin as u8);
            return true;
        }

        if line == "SET get_authkey" {
            if !self.require_admin(id, remote_ip, "get_authkey") {
                return true;
            }
            let key = new_authkey();
            send_msg(sink, "authkey_cb", &key);
            *self
                .current_authkey
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(key);
            return true;
        }

        if let Some(raw) = line.strip_prefix("SET save_cfg=") {
            if !self.require_admin(id, remote_ip, "save_cfg") {
                return true;
            }
            let json = decode(raw);
            if let Err(err) = self.config.replace_user(&json) {
                warn!(remote = %remote_ip, error = %err, "config save failed");
            }
            return true;
        }

        if let Some(raw) = line.strip_prefix("SET save_adm=") {
            // Persistance du domaine admin : classe Admin exigée en plus des
            // droits admin
            if class != ConnClass::Admin {
                warn!(remote = %remote_ip, ?class, "save_adm from non-admin connection class");
                return true;
            }
            if !self.require_admin(id, remote_ip, "save_adm") {
                return true;
            }
            let json = decode(raw);
            if let Err(err) = self.config.replace_admin(&json) {
                warn!(remote = %remote_ip, error = %err, "admin config save failed");
            }
            return true;
        }

        if line == "SET GET_USERS" {
            self.handle_get_users(class, sink);
            return true;
        }

        if let Some(args) = line.strip_prefix("SET DX_UPD ") {
            self.handle_dx_update(id, remote_ip, args, sink);
            return true;
        }

        if let Some(args) = line.strip_prefix("SET MKR ") {
            self.handle_markers(args, sink);
            return true;
        }

        if line == "SET GET_CONFIG" {
            let ident = self.config.get_server_ident();
            let doc = json!({
                "r": self.config.get_rx_channels(),
                "g": self.config.get_gps_channels(),
                "s": ident.serial_number,
                "pu": ident.public_ip,
                "pe": ident.ext_port,
                "pv": ident.private_ip,
                "pi": ident.int_port,
                "n": ident.netmask_bits,
                "m": ident.mac,
                "v1": ident.version_major,
                "v2": ident.version_minor,
            });
            send_msg(sink, "config_cb", doc);
            return true;
        }

        if let Some(args) = line.strip_prefix("SET STATS_UPD ") {
            let ch = kv_tokens(args)
                .iter()
                .find(|(k, _)| *k == "ch")
                .and_then(|(_, v)| v.parse::<usize>().ok());
            let rx_chans = self.config.get_rx_channels();
            // `ch == rx_chans` est permis : index du composite
            match ch {
                Some(ch) if ch <= rx_chans => {
                    send_msg(sink, "stats_cb", self.telemetry.stats_json(ch));
                }
                _ => warn!(remote = %remote_ip, args, "STATS_UPD with bad channel"),
            }
            return true;
        }

        if line == "SET gps_update" {
            send_msg_encoded(sink, "gps_update_cb", &self.telemetry.gps_json());
            return true;
        }

        if let Some(v) = line.strip_prefix("SET wf_comp=") {
            let Ok(v) = v.parse::<i32>() else {
                warn!(remote = %remote_ip, "wf_comp with bad value");
                return true;
            };
            let chan = self
                .registry
                .with_session(id, |s| s.rx_channel)
                .ok()
                .flatten();
            match chan {
                Some(ch) => {
                    let _ = self
                        .registry
                        .with_session_mut(id, |s| s.wf_compression = v != 0);
                    self.allocator.set_wf_compression(ch, v != 0);
                    info!(channel = ch, enabled = v != 0, "waterfall compression toggled");
                }
                None => warn!(remote = %remote_ip, "wf_comp on session without channel"),
            }
            return true;
        }

        if let Some(args) = line.strip_prefix("SET pref_export ") {
            self.handle_pref_export(id, remote_ip, args);
            return true;
        }

        if let Some(args) = line.strip_prefix("SET pref_import ") {
            self.handle_pref_import(id, args, sink);
            return true;
        }

        if let Some(raw) = line.strip_prefix("SET ident_user=") {
            self.handle_ident_user(id, remote_ip, raw);
            return true;
        }

        if let Some(v) = line.strip_prefix("SET need_status=") {
            if v.parse::<i32>().is_err() {
                warn!(remote = %remote_ip, "need_status with bad value");
                return true;
            }
            let status = self.config.get_status_msg();
            send_msg_encoded(sink, "status_msg_html", &format!("\x0c{status}"));
            return true;
        }

        if let Some(raw) = line.strip_prefix("SET geo=") {
            let geo = decode(raw);
            debug!(remote = %remote_ip, geo = %geo, "geolocation received");
            let _ = self.registry.with_session_mut(id, |s| s.geo = Some(geo));
            return true;
        }

        // Acceptés, journalisés, jetés
        if let Some(raw) = line.strip_prefix("SET geojson=") {
            debug!(remote = %remote_ip, geojson = %decode(raw), "geojson received");
            return true;
        }
        if let Some(raw) = line.strip_prefix("SET browser=") {
            debug!(remote = %remote_ip, browser = %decode(raw), "browser string received");
            return true;
        }

        if let Some(v) = line.strip_prefix("SET OVERRIDE inactivity_timeout=") {
            let Ok(timeout) = v.parse::<i32>() else {
                warn!(remote = %remote_ip, "inactivity_timeout override with bad value");
                return true;
            };
            info!(remote = %remote_ip, timeout, "inactivity timeout override");
            if timeout == 0 {
                let _ = self
                    .registry
                    .with_session_mut(id, |s| s.inactivity_timeout_override = true);
            }
            return true;
        }

        if let Some(v) = line.strip_prefix("SET clk_adj=") {
            self.handle_clk_adj(id, remote_ip, v);
            return true;
        }

        // SÉCURITÉ : bascules utilisées seulement en débogage
        if let Some(v) = line.strip_prefix("SET nocache=") {
            if let Ok(v) = v.parse::<i32>() {
                self.debug_flags().nocache = v != 0;
                info!(nocache = v != 0, "cache bypass toggled");
            }
            return true;
        }
        if let Some(v) = line.strip_prefix("SET ctrace=") {
            if let Ok(v) = v.parse::<i32>() {
                self.debug_flags().ctrace = v != 0;
                info!(ctrace = v != 0, "cache trace toggled");
            }
            return true;
        }
        if let Some(v) = line.strip_prefix("SET debug_v=") {
            if let Ok(v) = v.parse::<i32>() {
                self.debug_flags().debug_v = v;
            }
            return true;
        }
        if let Some(raw) = line.strip_prefix("SET debug_msg=") {
            info!(remote = %remote_ip, msg = %decode(raw), "debug message");
            return true;
        }

        // Bavardage de pairs, hors protocole mais toléré
        if line.starts_with("SERVER DE CLIENT") {
            return true;
        }
        if line == "PING" {
            return true;
        }
        // Séquence de contrôle de 2 octets vue à la fermeture de connexions
        if line.len() == 2 && line.as_bytes()[0] == ASCII_ETX {
            return true;
        }

        false
    }

    fn handle_get_users(&self, class: ConnClass, sink: &mut dyn ResponseSink) {
        let rx_chans = self.config.get_rx_channels();
        let entries = self.registry.user_list_snapshot();
        // L'adresse distante complète n'est montrée qu'aux consoles admin
        let admin_view = class == ConnClass::Admin;

        let mut arr = Vec::with_capacity(rx_chans);
        for i in 0..rx_chans {
            match entries.iter().find(|e| e.channel == i) {
                Some(e) => {
                    let t = e.connected_secs;
                    arr.push(json!({
                        "i": i,
                        "n": e.user.as_deref().map(encode).unwrap_or_default(),
                        "g": e.geo.as_deref().map(encode).unwrap_or_default(),
                        "f": e.freq_hz,
                        "m": e.mode,
                        "z": e.zoom,
                        "t": format!("{}:{:02}:{:02}", t / 3600, (t / 60) % 60, t % 60),
                        "e": e.ext_name.as_deref().map(encode).unwrap_or_default(),
                        "a": if admin_view { e.remote_ip.as_str() } else { "" },
                    }));
                }
                None => arr.push(json!({ "i": i })),
            }
        }
        send_msg(sink, "user_cb", serde_json::Value::Array(arr));
    }

    fn handle_dx_update(
        &self,
        id: SessionId,
        remote_ip: &str,
        args: &str,
        sink: &mut dyn ResponseSink,
    ) {
        // SÉCURITÉ : droits admin vérifiés avant toute analyse
        if !self.require_admin(id, remote_ip, "DX_UPD") {
            return;
        }

        let mut gid = None;
        let mut freq = None;
        let mut offset = None;
        let mut flags = None;
        let mut ident = None;
        let mut notes = None;
        for (k, v) in kv_tokens(args) {
            match k {
                "g" => gid = v.parse::<i64>().ok(),
                "f" => freq = v.parse::<f64>().ok(),
                "o" => offset = v.parse::<i32>().ok(),
                "m" => flags = v.parse::<u32>().ok(),
                "i" => ident = Some(v),
                "n" => notes = Some(v),
                _ => {}
            }
        }

        let (Some(gid), Some(freq)) = (gid, freq) else {
            warn!(remote = %remote_ip, args, "DX_UPD missing g/f parameters");
            return;
        };

        //  gid  freq    action
        //  !-1  -1      suppression
        //  !-1  !-1     modification
        //  -1   x       insertion
        let update = if gid >= 0 && freq == -1.0 {
            SpotUpdate::Delete { gid: gid as usize }
        } else {
            let (Some(offset), Some(flags), Some(ident), Some(notes)) =
                (offset, flags, ident, notes)
            else {
                warn!(remote = %remote_ip, args, "DX_UPD incomplete parameters");
                return;
            };
            // retrait du caractère sentinelle final transmis avec i= et n=
            let ident = strip_sentinel(ident);
            let notes = strip_sentinel(notes);
            if gid == -1 {
                info!(remote = %remote_ip, freq, "spot insert");
                SpotUpdate::Insert {
                    freq,
                    offset,
                    flags,
                    ident,
                    notes,
                }
            } else if gid >= 0 {
                info!(remote = %remote_ip, gid, freq, "spot modify");
                SpotUpdate::Modify {
                    gid: gid as usize,
                    freq,
                    offset,
                    flags,
                    ident,
                    notes,
                }
            } else {
                warn!(remote = %remote_ip, gid, "DX_UPD with bad group id");
                return;
            }
        };

        match self.spots.update(update) {
            // Le client redemande la liste à jour
            Ok(()) => sink.send("MSG request_dx_update".to_string()),
            Err(err) => warn!(remote = %remote_ip, error = %err, "spot update dropped"),
        }
    }

    fn handle_markers(&self, args: &str, sink: &mut dyn ResponseSink) {
        let mut min = None;
        let mut max = None;
        let mut zoom = None;
        let mut width = None;
        for (k, v) in kv_tokens(args) {
            match k {
                "min" => min = v.parse::<f64>().ok(),
                "max" => max = v.parse::<f64>().ok(),
                "zoom" => zoom = v.parse::<i32>().ok(),
                "width" => width = v.parse::<u32>().ok(),
                _ => {}
            }
        }
        let (Some(min), Some(max), Some(zoom), Some(width)) = (min, max, zoom, width) else {
            warn!(args, "MKR with bad parameters");
            return;
        };

        if self.spots.is_empty() {
            return;
        }

        let zoom = zoom.clamp(0, u8::MAX as i32) as u8;
        let t = chrono::Utc::now().timestamp();
        let mut sb = format!("[{{\"t\":{t}}}");
        for m in self.spots.markers(min, max, zoom, width) {
            // NB : ident et notes sont déjà stockés encodés en pourcent
            sb.push_str(&format!(
                ",{{\"g\":{},\"f\":{:.3},\"o\":{},\"b\":{},\"i\":\"{}\"",
                m.gid, m.freq, m.offset, m.flags, m.ident
            ));
            if !m.notes.is_empty() {
                sb.push_str(&format!(",\"n\":\"{}\"", m.notes));
            }
            sb.push('}');
        }
        sb.push(']');
        send_msg(sink, "mkr", sb);
    }

    fn handle_pref_export(&self, id: SessionId, remote_ip: &str, args: &str) {
        let mut pref_id = None;
        let mut pref = None;
        for (k, v) in kv_tokens(args) {
            match k {
                "id" => pref_id = Some(v),
                "pref" => pref = Some(v),
                _ => {}
            }
        }
        let (Some(pref_id), Some(pref)) = (pref_id, pref) else {
            warn!(remote = %remote_ip, args, "pref_export with bad parameters");
            return;
        };
        debug!(remote = %remote_ip, pref_id, len = pref.len(), "pref export");
        let _ = self
            .registry
            .export_pref(id, pref_id.to_string(), pref.to_string());
    }

    fn handle_pref_import(&self, id: SessionId, args: &str, sink: &mut dyn ResponseSink) {
        let pref_id = kv_tokens(args)
            .iter()
            .find(|(k, _)| *k == "id")
            .map(|(_, v)| v.to_string());
        let Some(pref_id) = pref_id else {
            warn!(session = id, args, "pref_import with bad parameters");
            return;
        };

        match self.registry.import_pref(&pref_id) {
            Some(m) => {
                let ch = m.channel.map(|c| c as i64).unwrap_or(-1);
                debug!(session = id, pref_id, channel = ch, "pref import match");
                sink.send(format!("MSG pref_import_ch={ch} pref_import={}", m.pref));
            }
            None => {
                debug!(session = id, pref_id, "pref import not found");
                sink.send("MSG pref_import=null".to_string());
            }
        }
    }

    fn handle_ident_user(&self, id: SessionId, remote_ip: &str, raw: &str) {
        let noname = raw.is_empty();
        let name = decode(raw);

        let arrived_now = self.registry.with_session_mut(id, |s| {
            if noname {
                // Pas de nom fourni : le nom est dérivé de l'adresse IP
                let set_user_ip =
                    s.user.is_none() || s.user.as_deref() != Some(s.remote_ip.as_str());
                if set_user_ip {
                    s.user = Some(s.remote_ip.clone());
                    s.is_user_ip = true;
                }
            } else {
                s.user = Some(name.clone());
                s.is_user_ip = false;
            }
            if !s.arrived {
                s.arrived = true;
                true
            } else {
                false
            }
        });

        if matches!(arrived_now, Ok(true)) {
            info!(remote = %remote_ip, user = %name, "user arrived");
        }
    }

    fn handle_clk_adj(&self, id: SessionId, remote_ip: &str, v: &str) {
        let Ok(hz) = v.parse::<i32>() else {
            warn!(remote = %remote_ip, "clk_adj with bad value");
            return;
        };
        if !self.require_admin(id, remote_ip, "clk_adj") {
            return;
        }

        let hz_limit = ppm_to_hz(
            self.clock.nominal_hz(),
            self.config.get_clk_adj_ppm_limit(),
        );
        if hz < -hz_limit || hz > hz_limit {
            warn!(remote = %remote_ip, hz, hz_limit, "clk_adj out of range");
            return;
        }

        self.clock.manual_adjust(hz);
        info!(hz, "manual clock adjustment");
    }

    /// Vérifie les droits admin ; un refus est journalisé avec l'adresse
    /// distante et la commande est abandonnée sans réponse au pair
    fn require_admin(&self, id: SessionId, remote_ip: &str, cmd: &str) -> bool {
        let admin = self
            .registry
            .with_session(id, |s| s.auth_admin)
            .unwrap_or(false);
        if !admin {
            warn!(remote = %remote_ip, cmd, "admin command without admin auth");
        }
        admin
    }

    fn debug_flags(&self) -> std::sync::MutexGuard<'_, DebugFlags> {
        self.debug.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Limite d'ajustement en Hz pour une horloge nominale et une tolérance PPM
fn ppm_to_hz(nominal_hz: f64, ppm: u32) -> i32 {
    (nominal_hz / 1e6 * ppm as f64) as i32
}

/// Clé d'authentification fraîche : 16 octets aléatoires en hexadécimal
fn new_authkey() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Retire le caractère sentinelle final transmis avec les champs texte
fn strip_sentinel(s: &str) -> String {
    let mut s = s.to_string();
    s.pop();
    s
}
