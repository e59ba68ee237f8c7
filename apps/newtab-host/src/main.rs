mod framing;

use newtab_core::theme::{CssVariables, Palette};
use newtab_core::{
    AppError, Coordinator, DataDirs, InstallReason, NewTabSession, Response, StorageScope,
};
use serde_json::Value;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use tracing::{debug, warn, Level};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: newtab-host [--data-dir <path>] [--scope sync|local] [-v]... \
[--installed <reason> | --print-page | --theme <hex> | --accent <hex> | --add-tile <name> <url> | --remove-tile <index>]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Serve,
    Installed(InstallReason),
    PrintPage,
    Theme(String),
    Accent(String),
    AddTile { name: String, url: String },
    RemoveTile(usize),
}

#[derive(Debug)]
struct HostArgs {
    data_dir: Option<PathBuf>,
    scope: StorageScope,
    verbosity: u8,
    command: Command,
}

fn set_command(next: Command, command: &mut Option<Command>) -> Result<(), String> {
    if command.is_some() {
        return Err("Only one command may be given".to_string());
    }
    *command = Some(next);
    Ok(())
}

fn parse_args(args: &[String]) -> Result<HostArgs, String> {
    let mut data_dir: Option<PathBuf> = None;
    let mut scope = StorageScope::Sync;
    let mut verbosity = 0u8;
    let mut command: Option<Command> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--data-dir" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "Missing --data-dir value".to_string())?;
                data_dir = Some(PathBuf::from(value));
            }
            "--scope" => {
                let value = iter.next().ok_or_else(|| "Missing --scope value".to_string())?;
                scope = StorageScope::parse(value)
                    .ok_or_else(|| format!("Unknown scope: {value}"))?;
            }
            "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
            "-vv" => verbosity = verbosity.saturating_add(2),
            "--installed" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "Missing --installed reason".to_string())?;
                let reason = InstallReason::parse(value)
                    .ok_or_else(|| format!("Unknown install reason: {value}"))?;
                set_command(Command::Installed(reason), &mut command)?;
            }
            "--print-page" => set_command(Command::PrintPage, &mut command)?,
            "--theme" => {
                let value = iter.next().ok_or_else(|| "Missing --theme value".to_string())?;
                set_command(Command::Theme(value.to_string()), &mut command)?;
            }
            "--accent" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "Missing --accent value".to_string())?;
                set_command(Command::Accent(value.to_string()), &mut command)?;
            }
            "--add-tile" => {
                let name = iter
                    .next()
                    .ok_or_else(|| "Missing --add-tile name".to_string())?;
                let url = iter
                    .next()
                    .ok_or_else(|| "Missing --add-tile url".to_string())?;
                set_command(
                    Command::AddTile {
                        name: name.to_string(),
                        url: url.to_string(),
                    },
                    &mut command,
                )?;
            }
            "--remove-tile" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "Missing --remove-tile index".to_string())?;
                let index = value
                    .parse::<usize>()
                    .map_err(|err| format!("Invalid tile index {value}: {err}"))?;
                set_command(Command::RemoveTile(index), &mut command)?;
            }
            "--help" | "-h" => return Err(String::new()),
            // The browser passes the caller's origin (and a window handle on
            // Windows) when it launches a native messaging host.
            other
                if other.starts_with("chrome-extension://")
                    || other.starts_with("--parent-window=") => {}
            _ => return Err(format!("Unknown argument: {arg}")),
        }
    }

    Ok(HostArgs {
        data_dir,
        scope,
        verbosity,
        command: command.unwrap_or(Command::Serve),
    })
}

/// Logs go to stderr; stdout carries protocol frames.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn failure(error: String) -> Response {
    Response::Failed {
        success: false,
        error,
    }
}

/// Encodes a reply, swapping in a failure when it would exceed the frame
/// limit so the extension always gets an answer.
fn encode_response(response: &Response) -> io::Result<Vec<u8>> {
    let encoded = serde_json::to_vec(response)?;
    if encoded.len() <= framing::MAX_OUTGOING {
        return Ok(encoded);
    }
    warn!(bytes = encoded.len(), "response exceeds frame limit");
    let fallback = failure(format!("response too large: {} bytes", encoded.len()));
    Ok(serde_json::to_vec(&fallback)?)
}

fn serve<R: Read, W: Write>(
    coordinator: &Coordinator,
    reader: &mut R,
    writer: &mut W,
) -> io::Result<()> {
    while let Some(payload) = framing::read_message(reader)? {
        let response = match serde_json::from_slice::<Value>(&payload) {
            Ok(message) => {
                debug!(message = %message, "request");
                coordinator.handle_value(message)
            }
            Err(err) => failure(format!("invalid json: {err}")),
        };
        framing::write_message(writer, &encode_response(&response)?)?;
    }
    Ok(())
}

fn open_coordinator(dirs: &DataDirs, scope: StorageScope) -> Result<Coordinator, String> {
    let store = dirs.open_store(scope).map_err(|err| err.to_string())?;
    Ok(Coordinator::new(store))
}

fn run(args: HostArgs) -> Result<(), String> {
    if let Command::Theme(accent) = &args.command {
        let palette = Palette::from_accent(accent).map_err(|err| err.to_string())?;
        print!("{}", palette.to_css());
        return Ok(());
    }

    let dirs = match args.data_dir {
        Some(root) => DataDirs::new(root),
        None => DataDirs::default_dirs().map_err(|err| err.to_string())?,
    };
    debug!(root = %dirs.root().display(), scope = args.scope.as_str(), "data directory");

    match args.command {
        Command::Installed(reason) => open_coordinator(&dirs, args.scope)?
            .on_installed(reason)
            .map_err(|err| err.to_string()),
        Command::Serve => {
            let coordinator = open_coordinator(&dirs, args.scope)?;
            coordinator.on_startup();
            let mut reader = io::stdin().lock();
            let mut writer = BufWriter::new(io::stdout().lock());
            serve(&coordinator, &mut reader, &mut writer)
                .map_err(|err| format!("native messaging: {err}"))
        }
        command => {
            let mut session =
                NewTabSession::open_in(&dirs, args.scope).map_err(|err| err.to_string())?;
            run_session_command(&mut session, command).map_err(|err| err.to_string())?;
            println!("{}", page_json(&session)?);
            if let Some(storage_error) = session.last_storage_error() {
                return Err(storage_error);
            }
            session.close().map_err(|err| err.to_string())
        }
    }
}

fn page_json(session: &NewTabSession) -> Result<String, String> {
    serde_json::to_string_pretty(&session.page()).map_err(|err| format!("encode page: {err}"))
}

fn run_session_command(session: &mut NewTabSession, command: Command) -> Result<(), AppError> {
    match command {
        Command::Accent(accent) => {
            let mut variables = CssVariables::default();
            session.apply_accent_color(&accent, &mut variables)?;
            for (name, value) in variables.entries() {
                println!("{name}: {value};");
            }
        }
        Command::AddTile { name, url } => {
            let handle = session.add_tile(&name, &url)?;
            println!("added tile #{}", handle.index);
        }
        Command::RemoveTile(index) => {
            let removed = session.remove_tile_at(index)?;
            println!("removed {}", removed.name);
        }
        Command::PrintPage | Command::Serve | Command::Installed(_) | Command::Theme(_) => {}
    }
    session.flush()?;
    Ok(())
}

fn main() {
    let args = std::env::args().collect::<Vec<_>>();
    let parsed = match parse_args(&args) {
        Ok(value) => value,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    init_logging(parsed.verbosity);

    if let Err(message) = run(parsed) {
        eprintln!("{message}");
        std::process::exit(1);
    }
}
