//! CLI entry point for `mimestamp`.
//!
//! Invoked by the MTA once per message, e.g.
//! `mimestamp --input=/var/spool/filter/msg.12345`. The flags mirror the
//! altermime command line so the filter can replace it in existing setups.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};

use mimestamp::config::{load_config, Config};
use mimestamp::parser::eml::parse_eml;
use mimestamp::stamp::inspect::{inspect, Inspection};
use mimestamp::stamp::process::process_mail_file;

#[derive(Parser)]
#[command(
    name = "mimestamp",
    version,
    about = "Embed a versioned inline image into outgoing HTML mail"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Message file to process in place
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Accepted for altermime compatibility, ignored
    #[arg(long, value_name = "FILE")]
    disclaimer: Option<PathBuf>,

    /// Accepted for altermime compatibility, ignored
    #[arg(long = "disclaimer-html", value_name = "FILE")]
    disclaimer_html: Option<PathBuf>,

    /// Configuration file (default: $MIMESTAMP_CONFIG, then the user config dir)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Compute the result but never write the message file
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the MIME structure and what the filter would decide
    Inspect {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.dry_run {
        config.general.dry_run = true;
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Some(Commands::Inspect { path, json }) => cmd_inspect(&path, json, &config),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
        None => {
            if cli.disclaimer.is_some() || cli.disclaimer_html.is_some() {
                tracing::debug!("Ignoring --disclaimer options");
            }
            match cli.input {
                Some(path) => cmd_process(&path, &config),
                None => anyhow::bail!("No input file given, use --input=FILE"),
            }
        }
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config
        .general
        .log_dir
        .as_deref()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    if let Some(log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::never(log_dir, "mimestamp.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Filter one message file in place.
fn cmd_process(path: &Path, config: &Config) -> anyhow::Result<()> {
    let report = process_mail_file(path, config)
        .with_context(|| format!("Failed to process {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        outcome = %report.outcome,
        written = report.written,
        "Done"
    );
    Ok(())
}

/// Print the outline of a message without modifying it.
fn cmd_inspect(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let (raw, message) = parse_eml(path, config.general.read_timeout())
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = inspect(&message, config);

    if json {
        let output = serde_json::json!({
            "file": path.to_string_lossy(),
            "size": raw.len(),
            "inspection": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_inspection_table(path, raw.len(), &report);
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mimestamp", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print an inspection in a human-readable table.
fn print_inspection_table(path: &Path, size: usize, report: &Inspection) {
    use humansize::{format_size, BINARY};

    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!();
    println!("  {:<14} {}", "File", path.display());
    println!("  {:<14} {}", "Size", format_size(size, BINARY));
    println!("  {:<14} {}", "Message-ID", or_dash(&report.message_id));
    println!("  {:<14} {}", "From", or_dash(&report.from));
    println!("  {:<14} {}", "To", or_dash(&report.to));
    println!("  {:<14} {}", "Cc", or_dash(&report.cc));
    println!("  {:<14} {:?}", "Line ending", report.line_ending);
    match &report.skip {
        None => println!("  {:<14} yes", "Eligible"),
        Some(reason) => println!("  {:<14} no ({reason})", "Eligible"),
    }
    println!("  {:<14} {}", "Image", report.image.as_str());

    println!();
    println!("  {:<44} {:<18} {:>10}  Notes", "Part", "Encoding", "Size");
    println!("  {}", "-".repeat(86));
    for entry in &report.outline {
        let name = format!("{}{}", "  ".repeat(entry.depth), entry.content_type);
        let size = if entry.size > 0 {
            format_size(entry.size, BINARY)
        } else {
            String::new()
        };
        let mut notes = Vec::new();
        if entry.placeholder {
            notes.push("placeholder".to_string());
        }
        if let Some(state) = entry.image {
            notes.push(format!("image {}", state.as_str()));
        }
        println!(
            "  {:<44} {:<18} {:>10}  {}",
            name,
            entry.transfer_encoding.as_deref().unwrap_or(""),
            size,
            notes.join(", ")
        );
    }
    println!();
}
