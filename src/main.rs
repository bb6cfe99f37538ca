//! CLI entry point for postpress

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use postpress::commands::check::ReportFormat;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "postpress")]
#[command(version)]
#[command(about = "A strict static site builder for Jekyll-style Markdown blogs", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate static files
    #[command(alias = "g")]
    Generate {
        /// Treat broken references as errors
        #[arg(long)]
        strict: bool,

        /// Watch for file changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Validate content and report broken references without writing output
    Check {
        /// Exit with an error when any reference is broken
        #[arg(long)]
        strict: bool,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// List site information
    List {
        /// Type of content to list (posts, pages, categories, tags)
        #[arg(default_value = "posts")]
        r#type: String,
    },

    /// Clean the public folder
    Clean,

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "postpress=debug,info"
    } else {
        "postpress=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let base_dir = base_dir.canonicalize().unwrap_or(base_dir);

    match cli.command {
        Commands::Generate { strict, watch } => {
            let site = postpress::Site::new(&base_dir)?;
            tracing::info!("Generating static files...");

            if let Some(stats) = postpress::commands::generate::first_build(&site, strict, watch)? {
                println!(
                    "Generated {} files from {} documents ({} broken references)",
                    stats.files, stats.documents, stats.broken_references
                );
            }

            if watch {
                postpress::commands::generate::watch(&site, strict)?;
            }
        }

        Commands::Check { strict, format } => {
            let site = postpress::Site::new(&base_dir)?;
            postpress::commands::check::run(&site, strict, format)?;
        }

        Commands::List { r#type } => {
            let site = postpress::Site::new(&base_dir)?;
            postpress::commands::list::run(&site, &r#type)?;
        }

        Commands::Clean => {
            let site = postpress::Site::new(&base_dir)?;
            tracing::info!("Cleaning public folder...");
            site.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::Version => {
            println!("postpress version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
