//! Console interactive sur le canal de contrôle
//!
//! Usage:
//!   cargo run --example console -- [répertoire_config]
//!
//! Ouvre une session admin locale pré-armée en superutilisateur, lit des
//! lignes de commande sur l'entrée standard et affiche les réponses.
//! Commencer par `SET auth t=admin p=#` puis essayer par exemple
//! `SET GET_CONFIG` ou `SET DX_UPD g=-1 f=7040.0 o=0 m=0 i=FT8x n=x`.

use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use wrxcmd::{
    ChannelAllocator, ClockControl, CommandRouter, GpsReceiver, GpsSnapshot, NullHooks,
    SubnetLocality, ThroughputStats,
};
use wrxconfig::Config;
use wrxdx::SpotStore;
use wrxsession::{ConnClass, SessionRegistry, MAX_SESSIONS};

struct IdleChannels;

impl ChannelAllocator for IdleChannels {
    fn free_channels(&self) -> usize {
        4
    }

    fn throughput(&self, _ch: usize) -> ThroughputStats {
        ThroughputStats::default()
    }

    fn set_wf_compression(&self, ch: usize, enabled: bool) {
        println!("# wf_compression(ch={ch}) = {enabled}");
    }
}

struct NoGps;

impl GpsReceiver for NoGps {
    fn snapshot(&self) -> GpsSnapshot {
        GpsSnapshot::default()
    }
}

struct FixedClock;

impl ClockControl for FixedClock {
    fn nominal_hz(&self) -> f64 {
        66_666_600.0
    }

    fn adc_clock_mhz(&self) -> f64 {
        66.6666
    }

    fn corrections(&self) -> u32 {
        0
    }

    fn manual_adjust(&self, hz: i32) {
        println!("# manual_adjust({hz} Hz)");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dir = args.get(1).map(String::as_str).unwrap_or(".wrxconsole");
    std::fs::create_dir_all(dir)?;

    let config = Arc::new(Config::load(dir)?);
    let registry = Arc::new(SessionRegistry::new(MAX_SESSIONS));
    let spots = Arc::new(SpotStore::new(config.clone())?);
    let router = CommandRouter::new(
        config,
        registry.clone(),
        spots,
        Arc::new(IdleChannels),
        Arc::new(NoGps),
        Arc::new(FixedClock),
        Arc::new(SubnetLocality),
        Arc::new(NullHooks),
    );

    // Console locale de confiance : la prochaine tentative d'authentification
    // est acceptée quel que soit le mot de passe
    router.auth_gate().arm_superuser();

    let id = registry.open(ConnClass::Admin, "127.0.0.1")?;
    println!("# session {id} ouverte, tapez vos commandes (Ctrl-D pour quitter)");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let mut responses: Vec<String> = Vec::new();
        if !router.handle(id, line, &mut responses).await {
            println!("# commande non reconnue");
        }
        for r in responses {
            println!("{r}");
        }
    }

    registry.close(id)?;
    Ok(())
}
