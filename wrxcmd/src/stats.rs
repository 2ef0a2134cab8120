//! Agrégateur de télémétrie : instantanés JSON des compteurs par canal,
//! de l'état GPS et de la correction d'horloge.
//!
//! Strictement en lecture seule : les parcours du registre se font sous son
//! verrou de lecture et aucun état de session n'est modifié.

use crate::traits::{ChannelAllocator, ClockControl, GpsReceiver};
use serde_json::json;
use std::sync::Arc;
use wrxconfig::Config;
use wrxsession::SessionRegistry;

pub struct TelemetryAggregator {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    allocator: Arc<dyn ChannelAllocator>,
    gps: Arc<dyn GpsReceiver>,
    clock: Arc<dyn ClockControl>,
}

impl TelemetryAggregator {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        allocator: Arc<dyn ChannelAllocator>,
        gps: Arc<dyn GpsReceiver>,
        clock: Arc<dyn ClockControl>,
    ) -> Self {
        Self {
            config,
            registry,
            allocator,
            gps,
            clock,
        }
    }

    /// Instantané des statistiques serveur pour `SET STATS_UPD ch=<i>`.
    ///
    /// Un canal inactif contribue zéro partout ; aucun canal ne peut bloquer
    /// la construction de l'instantané.
    pub fn stats_json(&self, ch: usize) -> String {
        let t = self.allocator.throughput(ch);
        let (underruns, seq_errors) = self.registry.error_counters();
        let g = self.gps.snapshot();
        let sum_kbps = t.audio_kbps + t.waterfall_kbps + t.http_kbps;

        let utc = chrono::Utc::now().format("%H:%M").to_string();
        let local = chrono::Local::now().format("%H:%M").to_string();

        json!({
            // Débits
            "aa": t.audio_kbps.round() as i64,
            "aw": t.waterfall_kbps.round() as i64,
            "af": t.waterfall_fps.round() as i64,
            "at": t.waterfall_fps_composite.round() as i64,
            "ah": t.http_kbps.round() as i64,
            "as": sum_kbps.round() as i64,
            // Résumé GPS et horloge
            "ga": g.acquiring as u8,
            "gt": g.tracking,
            "gg": g.good,
            "gf": g.fixes,
            "gc": round6(self.clock.adc_clock_mhz()),
            "go": self.clock.corrections(),
            // Erreurs audio cumulées et occupation des tampons
            "ad": t.audio_dropped,
            "au": underruns,
            "ae": seq_errors,
            "ar": t.pump_resets,
            "an": t.buffer_histogram.len(),
            "ap": t.buffer_histogram,
            // Heures serveur
            "tu": utc,
            "tl": local,
            "ti": self.config.get_tz_id(),
            "tn": self.config.get_tz_name(),
        })
        .to_string()
    }

    /// Instantané GPS complet pour `SET gps_update`
    pub fn gps_json(&self) -> String {
        let g = self.gps.snapshot();

        let channels: Vec<_> = g
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| {
                json!({
                    "ch": i,
                    "prn": c.prn,
                    "snr": c.snr,
                    "rssi": c.rssi,
                    "gain": c.gain,
                    "hold": c.hold,
                    "wdog": c.wdog,
                    "unlock": c.unlocked,
                    "parity": c.parity,
                    "sub": c.subframes,
                    "sub_renew": c.subframes_renewed,
                    "novfl": c.overflows,
                })
            })
            .collect();

        let mut doc = json!({
            "FFTch": g.fft_ch,
            "ch": channels,
            "run": fmt_run(g.run_secs),
            "ttff": g.ttff_secs.map(fmt_min_sec),
            "gpstime": g.gps_time,
            "utc_offset": g.utc_offset_secs.map(|s| format!("{s:+} sec")),
            "acq": g.acquiring as u8,
            "track": g.tracking,
            "good": g.good,
            "fixes": g.fixes,
            "adc_clk": round6(self.clock.adc_clock_mhz()),
            "adc_corr": self.clock.corrections(),
        });

        let map = match doc.as_object_mut() {
            Some(map) => map,
            None => return doc.to_string(),
        };
        match &g.position {
            Some(p) => {
                map.insert("lat".into(), json!(fmt_coord(p.lat, 'N', 'S')));
                map.insert("lon".into(), json!(fmt_coord(p.lon, 'E', 'W')));
                map.insert("alt".into(), json!(format!("{:.0} m", p.alt_m)));
                map.insert(
                    "map".into(),
                    json!(format!(
                        "<a href='http://wikimapia.org/#lang=en&lat={:.6}&lon={:.6}&z=18&m=b' target='_blank'>wikimapia.org</a>",
                        p.lat, p.lon
                    )),
                );
            }
            None => {
                map.insert("lat".into(), serde_json::Value::Null);
            }
        }

        doc.to_string()
    }
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// "H:MM:SS" au-delà d'une heure, "M:SS" en dessous
fn fmt_run(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    } else {
        format!("{}:{:02}", (secs / 60) % 60, secs % 60)
    }
}

fn fmt_min_sec(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Coordonnée non signée suivie de l'hémisphère
fn fmt_coord(deg: f64, positive: char, negative: char) -> String {
    let hemi = if deg >= 0.0 { positive } else { negative };
    format!("{:.6} {}", deg.abs(), hemi)
}
