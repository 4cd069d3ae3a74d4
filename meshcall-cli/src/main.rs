use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use meshcall_core::{PeerId, Profile, Role, Sender, SessionCode};
use meshcall_session::{
    Collaborators, LocalRelay, SessionConfig, SessionCoordinator, SessionError, SessionEvent,
    SessionHandle, SessionParams, WebRtcLinkFactory, WsTransport, relay_router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall")]
#[command(about = "Signaling relay and terminal client for mesh sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a signaling relay over WebSocket.
    Relay {
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: SocketAddr,
    },

    /// Join a session and drive it from stdin.
    Join(JoinArgs),
}

#[derive(clap::Args)]
struct JoinArgs {
    #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    #[arg(short, long)]
    session: String,

    #[arg(short, long)]
    name: String,

    #[arg(long)]
    president: bool,

    /// JSON file with session tunables.
    #[arg(long)]
    config: Option<PathBuf>,
}

const HELP: &str = "\
/hand /lower      raise or lower your hand
/floor /release   take or release the microphone floor
/clear            clear every floor (president)
/share /unshare   claim or release the screen-share slot
/screen           ask the current sharer for their screen
/record /stop     toggle session recording (president)
/state            print the session state
/quit             leave the session
anything else     send as chat";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { addr } => run_relay(addr).await,
        Commands::Join(args) => run_client(args).await,
    }
}

async fn run_relay(addr: SocketAddr) -> Result<()> {
    let app = relay_router(LocalRelay::new());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!(
        "{} ws://{}/ws",
        "📡 Relay listening on".green().bold(),
        addr
    );

    axum::serve(listener, app)
        .await
        .context("Relay server stopped")?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
}

async fn run_client(args: JoinArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let role = if args.president {
        Role::President
    } else {
        Role::Member
    };
    let local = Sender {
        peer_id: PeerId::new(),
        profile: Profile::new(args.name.clone(), args.name),
        role,
    };
    info!("Joining '{}' as {}", args.session, local.peer_id);

    let (transport, transport_rx) = WsTransport::connect(args.url);
    let params = SessionParams::new(SessionCode::new(args.session), local).with_config(config);
    let (coordinator, handle) = SessionCoordinator::new(
        params,
        Arc::new(transport),
        transport_rx,
        Arc::new(WebRtcLinkFactory::default()),
        Collaborators::default(),
    );
    tokio::spawn(coordinator.run());

    // The terminal has no devices; declaring none still lets offers go out.
    handle.set_local_tracks(Vec::new()).await?;
    tokio::spawn(print_events(handle.clone()));

    println!("{}", "Type /help for commands.".dimmed());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    command => {
                        if let Err(e) = run_command(&handle, command).await {
                            println!("{} {}", "✖".red().bold(), e);
                        }
                    }
                }
            }
        }
    }

    handle.leave().await?;
    println!("{}", "👋 Left the session".green());
    Ok(())
}

async fn run_command(handle: &SessionHandle, command: &str) -> Result<(), SessionError> {
    match command {
        "" => Ok(()),
        "/help" => {
            println!("{}", HELP);
            Ok(())
        }
        "/hand" => handle.raise_hand().await,
        "/lower" => handle.lower_hand().await,
        "/floor" => handle.take_floor().await,
        "/release" => handle.release_floor().await,
        "/clear" => handle.revoke_all_floors().await,
        "/share" => handle.acquire_screen_share().await,
        "/unshare" => handle.release_screen_share().await,
        "/screen" => handle.request_screen().await,
        "/record" => handle.start_recording().await,
        "/stop" => handle.stop_recording().await,
        "/state" => {
            let snapshot = handle.snapshot().await?;
            println!("{} {:?}", "status:".cyan(), snapshot.status);
            println!("{} {:?}", "state:".cyan(), snapshot.state);
            for peer in &snapshot.peers {
                println!(
                    "  {} {} ({:?})",
                    peer.profile.name.bold(),
                    peer.peer_id,
                    peer.connection_state
                );
            }
            Ok(())
        }
        unknown if unknown.starts_with('/') => {
            println!("{} {}", "Unknown command".yellow(), unknown);
            Ok(())
        }
        chat => handle.send_chat(chat).await,
    }
}

async fn print_events(handle: SessionHandle) {
    let mut events = handle.subscribe();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                println!("{}", format!("({} events skipped)", n).dimmed());
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            SessionEvent::PeerJoined(sender) => {
                println!("{} {}", "➕".green(), sender.profile.name.bold())
            }
            SessionEvent::PeerLeft(peer_id) => println!("{} {}", "➖".yellow(), peer_id),
            SessionEvent::PeerConnected(peer_id) => {
                println!("{} {}", "🔗 connected to".green(), peer_id)
            }
            SessionEvent::PeerFailed(peer_id) => {
                println!("{} {}", "✖ link failed:".red(), peer_id)
            }
            SessionEvent::RemoteTrack { peer_id, track_id } => {
                println!("{} {} from {}", "🎞 track".cyan(), track_id, peer_id)
            }
            SessionEvent::StateChanged(state) => {
                println!("{} {:?}", "state:".dimmed(), state)
            }
            SessionEvent::ScreenShareLost { winner } => {
                println!("{} {}", "🖥 screen share taken over by".yellow(), winner)
            }
            SessionEvent::FloorCleared => println!("{}", "🎙 your floor was cleared".yellow()),
            SessionEvent::RecordingChanged(true) => println!("{}", "⏺ recording".red().bold()),
            SessionEvent::RecordingChanged(false) => println!("{}", "⏹ recording stopped".red()),
            SessionEvent::Chat { from, body } => {
                println!("{}: {}", from.profile.name.bold(), body)
            }
            SessionEvent::Reconciled(state) => {
                println!("{} {:?}", "✨ session state:".green(), state)
            }
        }
    }
}
