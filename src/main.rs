mod client;
mod config;
mod conversation;
mod monitor;
mod protocol;
mod tui;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use clap::{CommandFactory, Parser};
use config::{ConfigFile, ResolvedConfig};
use tracing_subscriber::EnvFilter;

use client::{Backend, Client};
use conversation::Conversation;
use protocol::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "deskpilot",
    version,
    about = "Chat with a desktop automation agent: plan, confirm, execute",
    long_about = None,
)]
struct Args {
    /// Task to run directly (omit to enter interactive TUI mode)
    task: Option<String>,

    /// Profile to use from config file
    #[arg(short, long, env = "DESKPILOT_PROFILE")]
    profile: Option<String>,

    /// Override backend base URL
    #[arg(long, env = "DESKPILOT_BASE_URL")]
    base_url: Option<String>,

    /// Start in this mode (agent or chatbot)
    #[arg(short, long, env = "DESKPILOT_MODE")]
    mode: Option<Mode>,

    /// Confirm a proposed execution without asking (single-shot only)
    #[arg(short, long)]
    yes: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Show timestamps on messages
    #[arg(long)]
    timestamps: bool,

    /// Write a default config file to ~/.config/deskpilot/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,

    /// Print recent execution history
    #[arg(long)]
    history: bool,

    /// Print backend system information
    #[arg(long)]
    system_info: bool,

    /// Print active processes
    #[arg(long)]
    processes: bool,

    /// Print task suggestions
    #[arg(long)]
    suggestions: bool,

    /// Roll back the last executed action
    #[arg(long)]
    rollback: bool,

    /// Update user preferences with a JSON object
    #[arg(long, value_name = "JSON")]
    preferences: Option<String>,

    /// Submit an audio file as a voice command
    #[arg(long, value_name = "FILE")]
    voice: Option<PathBuf>,

    /// Submit an image for analysis
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,
}

impl Args {
    fn wants_query(&self) -> bool {
        self.history
            || self.system_info
            || self.processes
            || self.suggestions
            || self.rollback
            || self.preferences.is_some()
            || self.voice.is_some()
            || self.image.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: deskpilot");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    let resolved = ResolvedConfig::resolve(
        &file,
        args.profile.as_deref(),
        args.base_url.as_deref(),
        args.mode,
    );

    let interactive = args.task.is_none() && !args.wants_query();
    // Held for the life of the process so buffered log lines are flushed.
    let _log_guard = init_logging(interactive, args.verbose)?;

    // ── Auxiliary queries ─────────────────────────────────────────────────────
    if args.wants_query() {
        return run_queries(&args, &resolved).await;
    }

    // ── Single-shot mode (non-TUI) ────────────────────────────────────────────
    if let Some(task) = args.task {
        return run_single_shot(task, resolved, args.yes).await;
    }

    // ── TUI mode ──────────────────────────────────────────────────────────────
    tui::run(resolved, args.timestamps).await
}

// ── Logging ───────────────────────────────────────────────────────────────────

/// TUI owns the terminal, so interactive sessions log to a file.
fn init_logging(
    interactive: bool,
    verbose: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default = if verbose { "deskpilot=debug" } else { "deskpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if !interactive {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    }

    let dir = config::state_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(&dir, "deskpilot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

// ── Single-shot ───────────────────────────────────────────────────────────────

async fn run_single_shot(task: String, resolved: ResolvedConfig, yes: bool) -> Result<()> {
    let client = Client::new(
        resolved.base_url.clone(),
        resolved.request_timeout,
        resolved.health_timeout,
    );

    println!();
    println!("  ▲ deskpilot  {}  ·  {} mode", resolved.profile_name, resolved.mode);
    println!();

    let mut convo = Conversation::new(resolved.mode);
    convo.set_connected(client.check_health().await);
    if !convo.is_connected() {
        bail!("backend unreachable at {}", resolved.base_url);
    }

    if !convo.handle_submit(&client, &task).await {
        bail!("nothing to submit");
    }
    let printed = print_new(&convo, 0);

    if convo.can_confirm() {
        if yes {
            convo.handle_confirm(&client).await;
            print_new(&convo, printed);
        } else {
            println!("  not executed. Rerun with --yes to confirm");
            println!();
        }
    }
    Ok(())
}

/// Print messages from `from` onward; returns the new log length.
fn print_new(convo: &Conversation, from: usize) -> usize {
    let messages = convo.messages();
    for msg in &messages[from.min(messages.len())..] {
        let lines = ui::message_lines(msg);
        let glyph = ui::kind_glyph(msg.kind);
        let label = ui::kind_label(msg.kind);
        match lines.split_first() {
            Some((first, rest)) => {
                println!("  {glyph} {label:<10} {first}");
                for line in rest {
                    println!("               {line}");
                }
            }
            None => println!("  {glyph} {label}"),
        }
        if let Some(summary) = msg
            .confirmation
            .as_ref()
            .and_then(|m| m.task_summary.as_deref())
            .filter(|s| !s.is_empty())
        {
            println!("               summary: {summary}");
        }
        println!();
    }
    messages.len()
}

// ── Auxiliary queries ─────────────────────────────────────────────────────────

async fn run_queries(args: &Args, resolved: &ResolvedConfig) -> Result<()> {
    let client = Client::new(
        resolved.base_url.clone(),
        resolved.request_timeout,
        resolved.health_timeout,
    );

    if args.history {
        print_json(client.get_history().await.context("history query failed")?);
    }
    if args.system_info {
        print_json(client.get_system_info().await.context("system info query failed")?);
    }
    if args.processes {
        print_json(client.get_active_processes().await.context("process query failed")?);
    }
    if args.suggestions {
        print_json(client.get_suggestions().await.context("suggestions query failed")?);
    }
    if let Some(raw) = &args.preferences {
        let prefs: serde_json::Value =
            serde_json::from_str(raw).context("--preferences expects a JSON object")?;
        print_json(client.update_preferences(&prefs).await.context("preferences update failed")?);
    }
    if args.rollback {
        print_json(client.rollback_last_action().await.context("rollback failed")?);
    }
    if let Some(path) = &args.voice {
        let data = encode_file(path)?;
        print_json(client.submit_voice(data).await.context("voice command failed")?);
    }
    if let Some(path) = &args.image {
        let data = encode_file(path)?;
        print_json(client.submit_image(data).await.context("image analysis failed")?);
    }
    Ok(())
}

fn print_json(value: serde_json::Value) {
    println!("{}", ui::pretty_json(&value));
}

fn encode_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

// ── Profiles ──────────────────────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    let mut entries: Vec<_> = file.profiles.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    println!();
    println!("  Profiles");
    if entries.is_empty() {
        println!("  (none, run `deskpilot --init`)");
        println!();
    }
    for (name, p) in entries {
        let marker = if *name == file.default_profile { " ←" } else { "" };
        println!("  {name}{marker}");
        println!("    base_url  {}", p.base_url);
        println!("    mode      {}", p.mode);
        println!("    health    every {}s (timeout {}s)", p.health_interval_secs, p.health_timeout_secs);
        println!("    timeout   {}s", p.request_timeout_secs);
        println!();
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => bail!("Unknown shell: {shell_name} (supported: bash, zsh, fish, elvish)"),
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "deskpilot", &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Args::command().debug_assert();
        assert_eq!(
            Args::command().get_about().map(|s| s.to_string()).as_deref(),
            Some("Chat with a desktop automation agent: plan, confirm, execute")
        );
        let args = Args::try_parse_from(["deskpilot", "--mode", "chatbot", "--yes", "tidy up"]).unwrap();
        assert_eq!(args.mode, Some(Mode::Chatbot));
        assert!(args.yes);
        assert_eq!(args.task.as_deref(), Some("tidy up"));
        assert!(!args.wants_query());
    }

    #[test]
    fn test_query_flags() {
        let args = Args::try_parse_from(["deskpilot", "--rollback"]).unwrap();
        assert!(args.wants_query());
        assert!(Args::try_parse_from(["deskpilot", "--mode", "robot"]).is_err());
    }

    #[test]
    fn test_encode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"hi").unwrap();
        assert_eq!(encode_file(&path).unwrap(), "aGk=");
        assert!(encode_file(&dir.path().join("missing")).is_err());
    }
}
