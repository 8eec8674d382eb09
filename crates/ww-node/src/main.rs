mod config;

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use ww_server::{
    serve_readiness, serve_replica, serve_store, GrpcShotDispatcher, GrpcStartBroadcaster,
};
use ww_shootout::identity::parse_id;
use ww_shootout::roster::{load_roster, validate_replicas};
use ww_shootout::{
    BroadcastCoordinator, Cancellation, DamageEngine, DnsResolver, ShotScheduler, StartSignal,
    StartupOutcome, StartupSynchronizer, TargetSelector,
};
use ww_store::{Datastore, EtcdDatastore, MemDatastore, RemoteDatastore, StoreEndpoint};
use ww_types::{Combatant, CombatantId};

use crate::config::Config;

#[derive(clap::Parser, Debug)]
#[command(name = "ww-node", about = "Wild West shootout node")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Serve the shared in-memory store over gRPC
    Store {
        #[arg(long, default_value = "0.0.0.0:2379")]
        addr: String,
    },
    /// Run one combatant replica
    Cowboy {
        /// `<app>-<id>`; the id selects the roster entry
        #[arg(long, env = "HOSTNAME")]
        hostname: String,
    },
    /// Wait for every replica, then broadcast the start instant
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let shutdown = Cancellation::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match cli.command {
        Command::Store { addr } => run_store(&addr, shutdown).await,
        Command::Cowboy { hostname } => run_cowboy(&config, &hostname, shutdown).await,
        Command::Controller => run_controller(&config, shutdown).await,
    }
}

async fn run_store(addr: &str, shutdown: Cancellation) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse().with_context(|| format!("invalid store addr: {addr}"))?;
    serve_store(addr, Arc::new(MemDatastore::new()), until(&shutdown)).await
}

async fn run_cowboy(config: &Config, hostname: &str, shutdown: Cancellation) -> anyhow::Result<()> {
    let sc = &config.shootout;
    let net = &config.network;
    validate_replicas(sc.replicas)?;
    let id = parse_id(hostname)?;
    let roster = load_roster(&sc.roster_path, sc.replicas)?;
    let combatant = usize::try_from(id)
        .ok()
        .and_then(|i| roster.get(i))
        .cloned()
        .with_context(|| format!("id {id} is outside the roster of {} replicas", sc.replicas))?;
    tracing::info!(id, name = %combatant.name, health = combatant.health, damage = combatant.damage, "cowboy starting");

    let timeout = sc.store_timeout();
    match StoreEndpoint::parse(&net.store_endpoint)
        .with_context(|| format!("invalid store endpoint: {}", net.store_endpoint))?
    {
        StoreEndpoint::Etcd(uri) => {
            tracing::info!(%uri, "using etcd store");
            let store = Arc::new(EtcdDatastore::connect_lazy(&uri, timeout)?);
            run_replica(config, id, combatant, store, shutdown).await
        }
        StoreEndpoint::Wildwest(uri) => {
            tracing::info!(%uri, "using wildwest store");
            let store = Arc::new(RemoteDatastore::connect_lazy(&uri, timeout)?);
            run_replica(config, id, combatant, store, shutdown).await
        }
    }
}

async fn run_replica<S: Datastore>(
    config: &Config,
    id: CombatantId,
    combatant: Combatant,
    store: Arc<S>,
    shutdown: Cancellation,
) -> anyhow::Result<()> {
    let sc = &config.shootout;
    let net = &config.network;

    // Fires when this replica's health reaches 0.
    let defeated = Cancellation::new();
    let engine = Arc::new(DamageEngine::new(id, store.clone(), sc.store_timeout(), {
        let defeated = defeated.clone();
        move || defeated.cancel()
    }));
    let start = Arc::new(StartSignal::new());

    let dispatcher = Arc::new(GrpcShotDispatcher::new(
        net.app_name.as_str(),
        net.service_name.as_str(),
        net.grpc_port,
        sc.connect_timeout(),
        sc.shot_timeout(),
    ));
    let scheduler = ShotScheduler::new(
        id,
        combatant.damage,
        sc.shot_interval(),
        TargetSelector::new(id, store.clone(), sc.store_timeout()),
        dispatcher,
    );
    let sync = StartupSynchronizer::new(id, combatant, store, start.clone(), sc.store_timeout())
        .with_start_wait_timeout(config.coordinator.start_wait_timeout());

    let (ready_tx, ready_rx) = watch::channel(false);
    let mut states = sync.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let ready = states.borrow_and_update().is_ready();
            ready_tx.send_replace(ready);
        }
    });

    let contest = async {
        let outcome = tokio::select! {
            res = sync.run(&scheduler, &defeated) => res?,
            _ = shutdown.cancelled() => return Ok(()),
        };
        match outcome {
            StartupOutcome::Winner => {
                let health = engine.health().await?;
                tracing::info!(id, health, "I am the last one standing");
            }
            StartupOutcome::Defeated => tracing::info!(id, "I'm dead"),
            StartupOutcome::DeadOnArrival => tracing::info!(id, "restarted after being shot dead"),
        }
        Ok::<_, anyhow::Error>(())
    };

    tokio::try_join!(
        serve_replica(any_addr(net.grpc_port), engine.clone(), start, until(&shutdown)),
        serve_readiness(any_addr(net.readiness_port), ready_rx, until(&shutdown)),
        contest,
    )?;
    Ok(())
}

async fn run_controller(config: &Config, shutdown: Cancellation) -> anyhow::Result<()> {
    validate_replicas(config.shootout.replicas)?;
    let net = &config.network;
    let coordinator = BroadcastCoordinator::new(
        config.coordinator(),
        DnsResolver { port: net.grpc_port },
        GrpcStartBroadcaster {
            app_name: net.app_name.clone(),
            service_name: net.service_name.clone(),
            grpc_port: net.grpc_port,
            connect_timeout: config.shootout.connect_timeout(),
        },
    );

    let (_ready_tx, ready_rx) = watch::channel(true);
    let broadcast = async {
        tokio::select! {
            res = coordinator.run() => {
                let report = res?;
                tracing::info!(
                    start_timestamp = report.start_timestamp,
                    delivered = report.delivered.len(),
                    failed = report.failed.len(),
                    "broadcast finished"
                );
            }
            _ = shutdown.cancelled() => {}
        }
        Ok::<_, anyhow::Error>(())
    };

    tokio::try_join!(
        serve_readiness(any_addr(net.readiness_port), ready_rx, until(&shutdown)),
        broadcast,
    )?;
    Ok(())
}

fn any_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

fn until(shutdown: &Cancellation) -> impl Future<Output = ()> + Send + 'static {
    let shutdown = shutdown.clone();
    async move { shutdown.cancelled().await }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
