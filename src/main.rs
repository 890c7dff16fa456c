//! causeway CLI: offline tools for the model-editing server.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use causeway::batch::parse_requests;
use causeway::config::ServerConfig;
use causeway::hierarchy::ClassHierarchy;
use causeway::registry::ModelRegistry;

#[derive(Parser)]
#[command(name = "causeway", version, about = "Causal-activity model editing tools")]
struct Cli {
    /// Server config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a config, then print the effective settings.
    CheckConfig,

    /// Load a hierarchy file and print its statistics.
    Hierarchy {
        /// Hierarchy JSON; defaults to `hierarchy_file` from the config.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Apply a JSON batch against the models in `data_dir` and print the response.
    ///
    /// Changes are only written back when the batch contains a `model store` request.
    Batch {
        /// File holding the `requests` array.
        #[arg(long)]
        file: PathBuf,

        /// User id recorded on changes.
        #[arg(long, default_value = "cli")]
        uid: String,

        /// Run without privileges; mutating requests are rejected.
        #[arg(long)]
        read_only: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => Ok(ServerConfig::load(path)?),
        None => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => {
            config.validate()?;
            let rendered = toml::to_string_pretty(&config).into_diagnostic()?;
            println!("{rendered}");
            if let Some(path) = &config.hierarchy_file {
                let stats = ClassHierarchy::load(path, &config.curies())?.stats();
                println!("# hierarchy: {} classes, {} properties", stats.classes, stats.properties);
            }
            println!("# configuration ok");
        }

        Commands::Hierarchy { file } => {
            let Some(path) = file.or_else(|| config.hierarchy_file.clone()) else {
                miette::bail!("no hierarchy file given; pass --file or set `hierarchy_file`");
            };
            let hierarchy = ClassHierarchy::load(&path, &config.curies())?;
            let json = serde_json::to_string_pretty(&hierarchy.stats()).into_diagnostic()?;
            println!("{json}");
        }

        Commands::Batch { file, uid, read_only } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let requests = parse_requests(&text)?;
            let registry = ModelRegistry::from_config(&config)?;
            let response = registry
                .handle_batch(Some(uid), Some("cli".into()), None, requests, !read_only)
                .await;
            registry.shutdown();
            let json = serde_json::to_string_pretty(&response).into_diagnostic()?;
            println!("{json}");
            if response.is_error() {
                miette::bail!("batch failed: {}", response.message);
            }
        }
    }

    Ok(())
}
