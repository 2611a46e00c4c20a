use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nested_filter::config::config_file_path;
use nested_filter::file::open_forest;
use nested_filter::{filter_forest, highlight, FilterConfig, RowIdScheme};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "nested-filter",
    version,
    about = "Filter hierarchical JSON rows by a search term and report rows to expand"
)]
struct Cli {
    /// Config file (defaults to the per-user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Filter a JSON forest and print the pruned rows with their expansion state
    Filter {
        /// JSON file holding an array of rows or a single row
        file: PathBuf,

        #[arg(long)]
        term: String,

        /// Field to search; repeat for several. Defaults to the configured fields
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Row key scheme for the expansion map: path, identifier or composite
        #[arg(long)]
        row_ids: Option<RowIdScheme>,

        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Print the highlight segments of a single string
    Highlight {
        text: String,

        #[arg(long)]
        term: String,
    },
    /// Inspect or change the stored config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    SetFields { fields: Vec<String> },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = FilterConfig::load_from(&config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;

    match cli.command {
        Commands::Filter { file, term, fields, row_ids, max_depth } => {
            let rows = open_forest(&file).with_context(|| format!("loading {}", file.display()))?;
            let fields = if fields.is_empty() { config.fields.clone() } else { fields };
            let mut options = config.filter_options();
            if let Some(depth) = max_depth {
                options.max_depth = depth;
            }
            let scheme = row_ids.unwrap_or(config.row_ids);

            let outcome = filter_forest(&rows, &term, fields.as_slice(), &options);
            info!(roots = outcome.forest.len(), expanded = outcome.expanded.len(), "filter done");
            let output = serde_json::json!({
                "forest": outcome.forest,
                "expanded": outcome.expanded.to_row_ids(scheme),
                "term": outcome.term,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Highlight { text, term } => {
            let result = highlight(Some(text.as_str()), &term);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::SetFields { fields } => {
                let updated = FilterConfig { fields, ..config };
                updated
                    .save_to(&config_path)
                    .with_context(|| format!("writing config {}", config_path.display()))?;
                info!(path = %config_path.display(), "config saved");
            }
        },
    }
    Ok(())
}
