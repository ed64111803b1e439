use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use logsift::agent::Agent;
use logsift::config::{default_config_dir, load_watch_config};
use logsift::logs::{detect, parse, read_line_lossy, SAMPLE_LINES};

/// Characters of the raw line shown by the demo
const DEMO_RAW_CHARS: usize = 60;

#[derive(Parser)]
#[command(name = "logsift")]
#[command(about = "Watches a log directory and turns JSON, Apache, Nginx and syslog lines into structured records")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: /etc/logsift if exists, otherwise ~/.config/logsift)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and watch a log directory, serving statistics over HTTP
    Watch {
        /// Directory to watch (overrides config and LOG_DIR)
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Stats endpoint port
        #[arg(short, long)]
        port: Option<u16>,
        /// Append parsed records as JSON lines to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Do not start the stats endpoint
        #[arg(long)]
        no_server: bool,
    },
    /// Parse every line of a file (or stdin) and print records as JSON lines
    Parse {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Print the detected format of a single line
    Detect {
        /// Raw log line
        line: String,
    },
    /// Run the built-in sample lines through the parser
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch {
            log_dir,
            port,
            output,
            no_server,
        } => {
            let config_dir = cli.config.unwrap_or_else(default_config_dir);
            let mut config = load_watch_config(&config_dir)?;
            config.apply_env_overrides();
            if let Some(log_dir) = log_dir {
                config.log_dir = log_dir;
            }
            if let Some(port) = port {
                config.stats_port = port;
            }
            if output.is_some() {
                config.output = output;
            }
            if no_server {
                config.server_enabled = false;
            }

            info!("Using config directory: {}", config_dir.display());

            let agent = Agent::new(config)?;
            agent.run().await?;
        }
        Commands::Parse { file } => {
            let (mut reader, source): (Box<dyn BufRead>, String) = match file {
                Some(path) => {
                    let file = std::fs::File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    (
                        Box::new(BufReader::new(file)),
                        path.to_string_lossy().into_owned(),
                    )
                }
                None => (Box::new(BufReader::new(io::stdin())), "stdin".to_string()),
            };

            let mut buffer = Vec::new();
            while let Some(line) = read_line_lossy(&mut reader, &mut buffer)
                .with_context(|| format!("Failed to read {}", source))?
            {
                let record = parse(line.trim(), &source);
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Commands::Detect { line } => {
            println!("{}", detect(&line));
        }
        Commands::Demo => {
            println!("=== Log Parsing Demo ===");
            for line in SAMPLE_LINES {
                let record = parse(line, "demo");
                println!();
                println!("Raw: {}", truncate(line, DEMO_RAW_CHARS));
                println!("Format: {}", detect(line));
                println!("Parsed: {}", serde_json::to_string_pretty(&record)?);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn truncate(line: &str, max_chars: usize) -> String {
    if line.chars().count() > max_chars {
        let head: String = line.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}
