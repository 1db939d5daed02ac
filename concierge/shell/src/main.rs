//! Concierge Shell - Line-oriented terminal surface for the assistant
//!
//! Reads one message per line from stdin, runs it through a
//! [`ConciergeClient`] and prints the transcript updates as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (config file from the XDG config dir, if present)
//! concierge-shell
//!
//! # Point at a staging endpoint as the admin surface, in English
//! concierge-shell --endpoint https://staging.example/api/assistant/chat \
//!     --audience admin_dev --locale en
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=concierge_core=debug concierge-shell
//! ```
//!
//! # Commands
//!
//! - `/clear`: empty the transcript and reset counters
//! - `/status`: show the connection badge, counters and fallback details
//! - `/lang <ka|en>`: switch the reply language
//! - `/quit`: exit (end of input works too)
//!
//! Ctrl-C aborts the exchange in flight.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use concierge_core::{
    default_config_path, load_config_from_path, Audience, ChatMessage, ClientUpdate,
    ConciergeClient, ConfigOverrides, HttpCompletionBackend, Locale, MessageRole, MessageStatus,
    ResponseMode,
};

/// Concierge Shell - terminal chat with the booking assistant
#[derive(Parser, Debug)]
#[command(name = "concierge-shell")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CONCIERGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Completion endpoint URL
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Deployment surface (public_front, admin_dev)
    #[arg(short = 'a', long, value_parser = parse_audience)]
    audience: Option<Audience>,

    /// Reply language (ka, en)
    #[arg(short = 'l', long, value_parser = parse_locale)]
    locale: Option<Locale>,

    /// Response mode (stream, single)
    #[arg(short = 'm', long, value_parser = parse_mode)]
    mode: Option<ResponseMode>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, env = "CONCIERGE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

fn parse_audience(value: &str) -> Result<Audience, String> {
    Audience::parse(value).ok_or_else(|| format!("unknown audience `{value}`"))
}

fn parse_locale(value: &str) -> Result<Locale, String> {
    Locale::parse(value).ok_or_else(|| format!("unknown locale `{value}`"))
}

fn parse_mode(value: &str) -> Result<ResponseMode, String> {
    ResponseMode::parse(value).ok_or_else(|| format!("unknown response mode `{value}`"))
}

/// A line typed by the user
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Message(&'a str),
    Clear,
    Status,
    Lang(Option<Locale>),
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message(line);
    };
    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some("clear") => Command::Clear,
        Some("status") => Command::Status,
        Some("lang") => Command::Lang(parts.next().and_then(Locale::parse)),
        Some("quit" | "exit") => Command::Quit,
        _ => Command::Unknown(line),
    }
}

/// Initialize logging to stderr so it never interleaves with the transcript
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "concierge_shell={level},concierge_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn render_message(message: &ChatMessage) -> String {
    let who = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    };
    let marker = match message.status {
        Some(MessageStatus::Error) => " (!)",
        _ => "",
    };
    format!("{who}{marker}: {}", message.plain_text())
}

/// Print updates until the client drops its sender
async fn print_updates(mut rx: mpsc::Receiver<ClientUpdate>) {
    while let Some(update) = rx.recv().await {
        match update {
            ClientUpdate::MessageAppended { message } if message.role == MessageRole::Assistant => {
                if !message.is_empty() {
                    println!("{}", render_message(&message));
                }
            }
            ClientUpdate::MessageFinalized { message } => println!("{}", render_message(&message)),
            ClientUpdate::StatusChanged { status } => println!("[status: {status}]"),
            ClientUpdate::TranscriptCleared => println!("[conversation cleared]"),
            ClientUpdate::MessageAppended { .. } | ClientUpdate::MessageUpdated { .. } => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config =
        load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    overrides.endpoint_url = args.endpoint;
    overrides.audience = args.audience;
    overrides.locale = args.locale;
    overrides.response_mode = args.mode;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        endpoint = %config.endpoint_url,
        audience = %config.audience,
        "Concierge shell starting"
    );

    let backend = HttpCompletionBackend::new(config.http_backend_config())
        .context("Failed to create HTTP backend")?;
    let (tx, rx) = mpsc::channel(64);
    let mut client = ConciergeClient::new(config, backend, tx).context("Invalid guard rules")?;

    let printer = tokio::spawn(print_updates(rx));

    let cancel = client.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_command(&line) {
            Command::Message(text) => {
                client.send_message(text).await;
            }
            Command::Clear => client.clear_history().await,
            Command::Status => {
                let counters = client.telemetry();
                println!(
                    "[status: {} | locale: {} | blocked: {} | fallback: {}]",
                    client.status(),
                    client.locale(),
                    counters.blocked,
                    counters.fallback
                );
                if let Some(details) = client.unavailable_details() {
                    println!(
                        "[unavailable: {} | status: {} | retry in {}s]",
                        details.code,
                        details
                            .status
                            .map_or_else(|| "n/a".to_string(), |s| s.to_string()),
                        details.retry_in_seconds
                    );
                }
            }
            Command::Lang(Some(locale)) => {
                client.set_locale(locale);
                println!("[locale: {locale}]");
            }
            Command::Lang(None) => println!("usage: /lang <ka|en>"),
            Command::Quit => break,
            Command::Unknown(line) => warn!(command = line, "Unknown command"),
        }
    }

    drop(client);
    if let Err(e) = printer.await {
        warn!(error = %e, "Printer task failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_message() {
        assert_eq!(
            parse_command("  Is the villa free?  "),
            Command::Message("Is the villa free?")
        );
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_command("/clear"), Command::Clear);
        assert_eq!(parse_command("/status"), Command::Status);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/lang en"), Command::Lang(Some(Locale::En)));
        assert_eq!(parse_command("/lang fr"), Command::Lang(None));
        assert_eq!(parse_command("/book"), Command::Unknown("/book"));
    }

    #[test]
    fn test_args_parse_audience_and_locale() {
        let args = Args::try_parse_from([
            "concierge-shell",
            "--audience",
            "admin_dev",
            "--locale",
            "en",
            "--mode",
            "single",
        ])
        .unwrap();
        assert_eq!(args.audience, Some(Audience::AdminDev));
        assert_eq!(args.locale, Some(Locale::En));
        assert_eq!(args.mode, Some(ResponseMode::Single));
        assert!(Args::try_parse_from(["concierge-shell", "--locale", "fr"]).is_err());
    }
}
