mod display;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use whorl_core::output::{get_formatter, HumanFormatter, OutputFormat, OutputFormatter};
use whorl_core::{BulkResolver, WhoisClient, WhoisConfig};

use display::{BulkProgress, ProgressWriterFactory, Spinner};

#[derive(Parser)]
#[command(name = "whorl")]
#[command(about = "WHOIS client that follows referrals to the authoritative server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human or json)
    #[arg(short, long, default_value = "human", global = true)]
    format: String,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// Configuration file (defaults to ./whorl.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Budget for a whole resolution chain, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Connection retries per server
    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Stop after the first server instead of following referrals
    #[arg(long, global = true)]
    shallow: bool,

    /// Resolve name servers to addresses
    #[arg(long, global = true)]
    annotate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a domain, IP address or AS number
    Lookup {
        /// Domain, IP address, or AS number (e.g., AS64500)
        target: String,
        /// Start at this server instead of the built-in table (host[:port][?args])
        #[arg(short, long)]
        server: Option<String>,
        /// Print the raw responses after the parsed fields
        #[arg(long)]
        raw: bool,
    },
    /// Resolve every target listed in a file
    Bulk {
        /// File with one target per line, # for comments, or CSV (uses first column)
        file: PathBuf,
        /// Resolutions running at the same time
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
    },
}

impl Settings {
    fn load(&self) -> anyhow::Result<WhoisConfig> {
        let mut config = WhoisConfig::load(self.config.as_deref())?;
        if let Some(secs) = self.timeout {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        if self.shallow {
            config = config.with_deep(false);
        }
        if self.annotate {
            config = config.with_annotated_nameservers(true);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(ProgressWriterFactory)
        .init();

    let cli = Cli::parse();

    let output_format: OutputFormat = cli.format.parse().unwrap_or_default();
    let config = cli.settings.load()?;

    execute_command(cli.command, config, output_format).await
}

async fn execute_command(
    command: Commands,
    config: WhoisConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let interactive = std::io::stderr().is_terminal();
    let deep = config.deep;
    let client = WhoisClient::with_config(config);

    match command {
        Commands::Lookup {
            target,
            server,
            raw,
        } => {
            let formatter: Box<dyn OutputFormatter> = match output_format {
                OutputFormat::Human if raw => Box::new(HumanFormatter::new().with_raw()),
                format => get_formatter(format),
            };

            let spinner = interactive.then(|| Spinner::new(&target));
            let client = match &spinner {
                Some(spinner) => client.with_hop_observer(spinner.observer()),
                None => client,
            };
            let result = match server {
                Some(server) => client.lookup_with_server(&target, &server, deep).await,
                None => client.lookup(&target, deep).await,
            };
            if let Some(spinner) = spinner {
                spinner.finish();
            }

            match result {
                Ok(record) => {
                    println!("{}", formatter.format_record(&target, &record));
                    if record.registry_info.servers.is_empty() {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", "Error:".red(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Bulk { file, concurrency } => {
            let content = std::fs::read_to_string(&file)?;
            let targets = whorl_core::bulk::parse_targets_from_file(&content);

            if targets.is_empty() {
                eprintln!(
                    "{} No targets found in {}. Expected one target per line, # for comments, or CSV (first column)",
                    "Error:".red(),
                    file.display()
                );
                std::process::exit(1);
            }

            let resolver = BulkResolver::new(client)
                .with_concurrency(concurrency)
                .with_deep(deep);

            let progress = interactive.then(|| BulkProgress::new(targets.len()));
            let results = resolver
                .resolve_all(targets, progress.as_ref().map(BulkProgress::callback))
                .await;
            drop(progress);

            println!("{}", get_formatter(output_format).format_bulk(&results));
        }
    }

    Ok(())
}
