//! LAN Soundboard
//!
//! Loads the sound library, joins the mute network and takes commands from
//! stdin (and the control API when enabled).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_soundboard::{
    audio::{list_output_devices, RodioOutput, SystemMixer},
    config::{default_config_path, default_sounds_dir, ConfigStore, TomlConfigStore},
    constants::{APP_NAME, CONFIG_FILE_NAME},
    library::{ClipSettings, LocalFileStore, SoundDraft},
    network::{Transport, UdpTransport},
    protocol::Notice,
    soundboard::{Backends, PreviewRequest, SettingsUpdate, Soundboard, SoundboardHandle},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Soundboard");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let store = TomlConfigStore::new(&config_path);
    let config = store
        .load()
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!("Config: {}", config_path.display());

    let sounds_dir = default_sounds_dir().unwrap_or_else(|| PathBuf::from(APP_NAME).join("sounds"));

    let mut receiver = None;
    let transport: Option<Arc<UdpTransport>> = if config.network.enabled {
        match UdpTransport::bind(&config.network) {
            Ok(transport) => Some(Arc::new(transport)),
            Err(e) => {
                tracing::warn!("Mute network unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let ui_config = config.ui.clone();
    let board = Soundboard::new(
        config,
        Box::new(store),
        Backends {
            output: Arc::new(RodioOutput::new()),
            volume: Arc::new(SystemMixer::new()),
            files: Arc::new(LocalFileStore::new(sounds_dir)),
            transport: transport.clone().map(|t| t as Arc<dyn Transport>),
        },
    );
    let mut notices = board.subscribe();
    let (handle, board_task) = board.spawn();

    if let Some(transport) = &transport {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        transport.spawn_receiver(handle.message_sender(), shutdown_rx);
        receiver = Some(shutdown_tx);
    }

    #[cfg(feature = "control-api")]
    if ui_config.enabled {
        lan_soundboard::ui::WebServer::new(ui_config, handle.clone()).start_background();
    }
    #[cfg(not(feature = "control-api"))]
    let _ = ui_config;

    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => print_notice(&notice),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Skipped {} notices", n);
                }
                Err(_) => break,
            }
        }
    });

    println!(
        "Commands: play <name>, stop, preview <file>, add <name> <hotkey> <file>, remove <name>, \
         move <from> <to>, device <id>, boost <on|off|1-100>, mute, unmute, list, devices, status, quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !run_command(&handle, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down");
    if let Err(e) = handle.shutdown().await {
        tracing::warn!("Shutdown: {}", e);
    }
    let _ = board_task.await;
    if let Some(shutdown) = receiver {
        let _ = shutdown.send(());
    }
    if let Some(transport) = transport {
        let stats = transport.stats();
        tracing::info!(
            "Mute packets: {} sent, {} received, {} invalid",
            stats.packets_sent,
            stats.packets_received,
            stats.packets_invalid
        );
    }
    Ok(())
}

/// Returns false when the console should exit
async fn run_command(handle: &SoundboardHandle, line: &str) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    let result = match command {
        "" => Ok(()),
        "play" => handle.play(arg).await,
        "stop" => handle.stop_all().await,
        "preview" => {
            handle
                .preview(PreviewRequest {
                    path: (!arg.is_empty()).then(|| PathBuf::from(arg)),
                    settings: ClipSettings::default(),
                })
                .await
        }
        "add" => match arg.splitn(3, ' ').collect::<Vec<_>>()[..] {
            [name, hotkey, file] => handle
                .save_sound(SoundDraft {
                    name: name.to_string(),
                    hotkey: hotkey.to_string(),
                    path: Some(PathBuf::from(file.trim())),
                    ..SoundDraft::default()
                })
                .await
                .map(|name| println!("  saved {}", name)),
            _ => usage("add <name> <hotkey> <file>"),
        },
        "remove" => handle.remove_sound(arg).await,
        "move" => match arg.split_whitespace().map(str::parse::<usize>).collect::<Vec<_>>()[..] {
            [Ok(from), Ok(to)] => handle.move_sound(from, to).await,
            _ => usage("move <from> <to>"),
        },
        "device" => {
            handle
                .update_settings(SettingsUpdate {
                    output_device: Some(arg.to_string()),
                    ..SettingsUpdate::default()
                })
                .await
        }
        "boost" => {
            let update = match arg {
                "on" => Some(SettingsUpdate {
                    volume_boost_enabled: Some(true),
                    ..SettingsUpdate::default()
                }),
                "off" => Some(SettingsUpdate {
                    volume_boost_enabled: Some(false),
                    ..SettingsUpdate::default()
                }),
                amount => amount.parse::<u8>().ok().map(|amount| SettingsUpdate {
                    volume_boost_amount: Some(amount),
                    ..SettingsUpdate::default()
                }),
            };
            match update {
                Some(update) => handle.update_settings(update).await,
                None => usage("boost <on|off|1-100>"),
            }
        }
        "mute" => handle.set_local_mute(true).await,
        "unmute" => handle.set_local_mute(false).await,
        "list" => handle.sounds().await.map(|sounds| {
            for sound in sounds {
                println!("  {:<24} {:<20} played {}x", sound.name, sound.hotkey, sound.play_count);
            }
        }),
        "devices" => {
            for device in list_output_devices() {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}{}", device.name, default_marker);
                println!("    ID: {}", device.id);
            }
            Ok(())
        }
        "status" => handle.status().await.map(|status| {
            println!(
                "  peer={} playing={:?} preview={} boosted={} muted={} (local={}, peers={:?})",
                status.peer_id,
                status.now_playing,
                status.previewing,
                status.boosted,
                status.muted,
                status.local_mute,
                status.mute_peers
            );
        }),
        "quit" | "exit" => return false,
        other => {
            println!("Unknown command: {}", other);
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("Error: {}", e);
    }
    true
}

fn usage(text: &str) -> lan_soundboard::Result<()> {
    println!("Usage: {}", text);
    Ok(())
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::NowPlaying { sound: Some(sound) } => println!("> playing {}", sound),
        Notice::NowPlaying { sound: None } => println!("> stopped"),
        Notice::Preview { label } => println!("> preview {:?}", label),
        Notice::MuteChanged { muted, peers } => {
            println!("> mute {} {:?}", if *muted { "on" } else { "off" }, peers)
        }
        Notice::Warning { message } => println!("! {}", message),
        Notice::Error { message } => println!("!! {}", message),
    }
}
