use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use worldsync_common::Transform;
use worldsync_kernel::WorldAction;
use worldsync_net::{Session, SessionConfig, install_network_world, network_world};
use worldsync_store::{Store, StoreOptions};

#[derive(Parser)]
#[command(name = "worldsync-cli", about = "CLI tool for worldsync sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run an in-process session: joins, moves, a teleport and a leave
    Simulate {
        /// YAML session config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of peers, host included
        #[arg(short, long)]
        peers: Option<usize>,
        /// Ticks to run after everyone joined
        #[arg(short, long)]
        ticks: Option<u64>,
    },
    /// Replay the host's applied history into a fresh store and compare digests
    Replay {
        /// Number of peers, host included
        #[arg(short, long, default_value = "3")]
        peers: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldsync-cli v{}", env!("CARGO_PKG_VERSION"));
            let config = SessionConfig::default();
            println!(
                "defaults: world={}, peers={}, ticks={}, dispatch_delay={}",
                config.world, config.peers, config.ticks, config.default_dispatch_delay
            );
        }
        Commands::Simulate {
            config,
            peers,
            ticks,
        } => {
            let mut config = match config {
                Some(path) => SessionConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SessionConfig::default(),
            };
            if let Some(peers) = peers {
                config.peers = peers;
            }
            if let Some(ticks) = ticks {
                config.ticks = ticks;
            }
            config.validate()?;
            println!(
                "Simulate: world={}, peers={}, ticks={}",
                config.world, config.peers, config.ticks
            );

            let mut session = simulate(config)?;
            report(&session)?;

            session.settle(64);
            println!(
                "Converged: {}",
                if session.converged()? { "OK" } else { "MISMATCH" }
            );
        }
        Commands::Replay { peers } => {
            let config = SessionConfig {
                peers,
                ..SessionConfig::default()
            };
            let session = simulate(config)?;
            let host = session.host().context("session has no host")?;
            let host_user = host.user();

            // Every recorded action is due.
            let mut replica: Store<WorldAction> = Store::new(
                StoreOptions::new("replay")
                    .dispatch_id(move || host_user)
                    .dispatch_time(|| u64::MAX),
            );
            install_network_world(&mut replica, host_user)?;
            let history = &host.store().actions().incoming_history;
            for action in history {
                replica.receive(action.clone());
            }
            let applied = replica.apply_incoming_actions();

            let live = host.network()?.digest();
            let replayed = network_world(&replica)?.digest();
            println!("Host history: {} actions, replayed {applied}", history.len());
            println!("Live digest:     {live:#018x}");
            println!("Replayed digest: {replayed:#018x}");
            println!(
                "Match: {}",
                if live == replayed { "OK" } else { "MISMATCH" }
            );
        }
    }

    Ok(())
}

fn simulate(config: SessionConfig) -> anyhow::Result<Session> {
    let peers = config.peers;
    let ticks = config.ticks;
    let mut session = Session::new(config)?;

    let users = (0..peers)
        .map(|i| session.join(&format!("peer-{i}")))
        .collect::<Result<Vec<_>, _>>()?;
    session.settle(64);

    for (i, user) in users.iter().enumerate() {
        if let Some(peer) = session.peer_mut(user) {
            peer.move_avatar(Transform::from_position(glam::Vec3::new(
                i as f32 * 2.0,
                0.0,
                3.0,
            )));
        }
    }
    session.run(ticks);

    if let Some(traveller) = users.get(1).filter(|_| users.len() > 2) {
        session.teleport(traveller)?;
        session.settle(64);
        session.rejoin(traveller)?;
    }
    if users.len() > 1 {
        if let Some(leaver) = users.last() {
            session.leave(leaver)?;
        }
    }
    session.settle(64);
    info!(tick = session.now(), peers = session.peers().len(), "simulation finished");
    Ok(session)
}

fn report(session: &Session) -> anyhow::Result<()> {
    for peer in session.peers() {
        let engine = peer.engine()?;
        let net = peer.network()?;
        let index = net
            .clients()
            .index_of(&peer.user())
            .map_or_else(|| "-".to_owned(), |index| index.to_string());
        println!(
            "{:<8} index={:<3} clients={} objects={} ready={} teleporting={} digest={:#018x}",
            peer.name(),
            index,
            net.clients().len(),
            net.object_count(),
            engine.is_ready(),
            engine.is_teleporting,
            net.digest()
        );
    }
    Ok(())
}
