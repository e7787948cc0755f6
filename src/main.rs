use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use clap::Parser;
use signalhub::{
    actors::hub::Hub,
    dispatch::DispatchKind,
    engine::rtc::WebRtcEngine,
    models::config::{DEFAULT_STUN_SERVER, IceConfiguration, IceServer, parse_ice_server},
    rendezvous::{Pairing, Rendezvous},
    server::{AppState, serve},
    signaling::Signaling,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    #[clap(env = "SIGNALHUB_HOST", long, default_value = "localhost")]
    host: String,
    #[clap(env = "SIGNALHUB_PORT", long, short, default_value_t = 1904)]
    port: u16,
    #[clap(
        env = "SIGNALHUB_ICE_SERVERS",
        long,
        short,
        value_parser = parse_ice_server,
        value_delimiter = ',',
        default_value = DEFAULT_STUN_SERVER,
    )]
    ice_servers: Vec<IceServer>,
    #[clap(env = "SIGNALHUB_PAIRING", long, value_enum, default_value_t = Pairing::ById)]
    pairing: Pairing,
    #[clap(env = "SIGNALHUB_PENDING_CAPACITY", long, default_value_t = 10)]
    pending_capacity: usize,
    #[clap(env = "SIGNALHUB_ANSWER_TIMEOUT", long, value_parser = humantime::parse_duration, default_value = "30s")]
    answer_timeout: Duration,
    #[clap(env = "SIGNALHUB_PENDING_TIMEOUT", long, value_parser = humantime::parse_duration, default_value = "60s")]
    pending_timeout: Duration,
    /// Defaults to `static/` next to the executable.
    #[clap(env = "SIGNALHUB_STATIC_DIR", long)]
    static_dir: Option<PathBuf>,
    #[clap(env = "SIGNALHUB_DISPATCH", long, value_enum, default_value_t = DispatchKind::Relay)]
    dispatch: DispatchKind,
}

fn default_static_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| anyhow!("executable has no parent directory"))?;
    Ok(dir.join("static"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let ice = IceConfiguration { ice_servers: args.ice_servers };
    let engine = Arc::new(WebRtcEngine::new()?);
    let rendezvous = Arc::new(Rendezvous::new(
        args.pairing,
        args.pending_capacity,
        args.answer_timeout,
    ));
    rendezvous.start_sweeper(args.pending_timeout);
    let (hub, hub_handle) = Hub::spawn(args.dispatch.build()).await?;
    let signaling = Arc::new(Signaling::new(engine, rendezvous, hub, ice));

    let assets = match args.static_dir {
        Some(dir) => dir,
        None => default_static_dir()?,
    };
    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!(
        "listening on {address}, pairing {:?}, dispatch {:?}, assets from {}",
        args.pairing,
        args.dispatch,
        assets.display(),
    );

    let state = AppState { signaling: signaling.clone(), assets: Arc::new(assets) };
    serve(listener, state, async {
        if let Err(err) = ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
        }
    })
    .await?;

    info!("shutting down");
    signaling.shutdown().await;
    hub_handle.await?;
    Ok(())
}
