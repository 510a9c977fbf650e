use chatlink::session::{SessionFacade, SessionHandle};
use chatlink::settings::{self, Settings};
use chatlink::speech::console::{ConsoleSynth, UnavailableCapture};
use chatlink::transport::websocket::WsConnector;
use chatlink::{ChatMessage, SessionUpdate};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "chatlink", about = "Terminal client for the chat backend")]
struct Args {
    /// Backend base URL (ws:// or wss://)
    #[arg(long)]
    server: Option<String>,
    /// Chat room to join
    #[arg(long)]
    room: Option<String>,
    #[arg(long)]
    username: Option<String>,
    /// Do not speak bot replies automatically
    #[arg(long)]
    no_auto_speak: bool,
    /// Settings file to use instead of the default location
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Persist the effective settings before connecting
    #[arg(long)]
    save: bool,
}

const HELP: &str = "commands: /play <id>  /stop  /listen  /unlisten  /autospeak on|off  \
/visible  /history  /end  /quit";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = resolve_settings(&args);
    if let Err(e) = settings.validate() {
        eprintln!("[chatlink] {}", e);
        std::process::exit(2);
    }
    if args.save {
        let saved = match &args.settings {
            Some(path) => settings::save_to(&settings, path),
            None => settings::save(&settings),
        };
        if let Err(e) = saved {
            log::warn!("[settings] {}", e);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("[chatlink] failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(settings));
}

fn resolve_settings(args: &Args) -> Settings {
    let mut settings = match &args.settings {
        Some(path) => settings::load_from(path),
        None => settings::load(),
    };
    if let Some(server) = &args.server {
        settings.server_url = server.clone();
    }
    if let Some(room) = &args.room {
        settings.room = room.clone();
    }
    if let Some(username) = &args.username {
        settings.username = username.clone();
    }
    if args.no_auto_speak {
        settings.auto_speak = false;
    }
    settings
}

async fn run(settings: Settings) {
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let facade = match SessionFacade::new(
        &settings,
        Arc::new(WsConnector),
        Box::new(UnavailableCapture),
        Box::new(ConsoleSynth::new()),
        updates_tx,
    ) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[chatlink] {}", e);
            return;
        }
    };
    let (handle, session_task) = facade.spawn();
    println!("{}", HELP);

    tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            render(&update);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("[chatlink] stdin: {}", e);
                break;
            }
        };
        if !dispatch(&handle, line.trim()).await {
            break;
        }
    }

    let _ = handle.shutdown();
    let _ = session_task.await;
}

/// Returns false when the user asked to quit.
async fn dispatch(handle: &SessionHandle, line: &str) -> bool {
    let mut parts = line.splitn(2, ' ');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    let result = match head {
        "" => Ok(()),
        "/quit" => return false,
        "/help" => {
            println!("{}", HELP);
            Ok(())
        }
        "/play" => match rest.parse::<i64>() {
            Ok(id) => handle.toggle_playback(id).await,
            Err(_) => {
                println!("usage: /play <message id>");
                Ok(())
            }
        },
        "/stop" => handle.stop_playback(),
        "/listen" => handle.start_capture().await,
        "/unlisten" => handle.stop_capture(),
        "/autospeak" => match rest {
            "on" => handle.set_auto_speak(true),
            "off" => handle.set_auto_speak(false),
            _ => {
                println!("usage: /autospeak on|off");
                Ok(())
            }
        },
        "/visible" => handle.set_visible(true),
        "/history" => handle.snapshot().await.map(|snapshot| {
            for message in &snapshot.messages {
                print_message(message);
            }
        }),
        "/end" => handle.end_session().await,
        _ if head.starts_with('/') => {
            println!("unknown command {}; {}", head, HELP);
            Ok(())
        }
        _ => handle.send_text(line).await.map(|_| ()),
    };
    match result {
        Ok(()) => true,
        Err(chatlink::SessionError::SessionClosed) => false,
        Err(e) => {
            println!("! {}", e);
            true
        }
    }
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] #{} {}: {}",
        message.date, message.id, message.sender, message.text
    );
}

fn render(update: &SessionUpdate) {
    match update {
        SessionUpdate::Connection(state) => println!("-- {}", state),
        SessionUpdate::MessageAppended(message) => print_message(message),
        SessionUpdate::HistoryMerged { added } if *added > 0 => {
            println!("-- {} earlier messages restored", added)
        }
        SessionUpdate::Typing(true) => println!("-- bot is typing..."),
        SessionUpdate::Listening(listening) => {
            println!("-- {}", if *listening { "listening" } else { "not listening" })
        }
        SessionUpdate::Input(text) if !text.is_empty() => println!("> {}", text),
        SessionUpdate::AutoSpeak(on) => {
            println!("-- auto-speak {}", if *on { "on" } else { "off" })
        }
        SessionUpdate::Identified { user_id, employee_id } => log::debug!(
            "[chatlink] identified user_id={:?} employee_id={:?}",
            user_id,
            employee_id
        ),
        SessionUpdate::ServerError(message) => println!("! server: {}", message),
        SessionUpdate::DeviceError(message) => println!("! {}", message),
        _ => {}
    }
}
