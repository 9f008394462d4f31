use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{debug, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use termcolor::{ColorChoice, StandardStream};

use findstream::config::ConfigManager;
use findstream::form::{build_export_request, build_search_request};
use findstream::protocol::{ContentType, SearchRequest};
use findstream::render::{self, Renderer};
use findstream::{
    ClientSettings, ContextType, CriteriaForm, ScopeForm, SearchResults, SearchStatus,
    SearchStreamClient,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL (overrides config and FINDSTREAM_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream search results from the server
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// Export complete results as CSV into this directory when there are too many to display
        #[arg(long, value_name = "DIR")]
        export_on_threshold: Option<PathBuf>,
    },
    /// Export complete search results as CSV
    Export {
        #[command(flatten)]
        query: QueryArgs,

        /// Directory to write the CSV file into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Args)]
struct QueryArgs {
    /// Text or regular expression to search for
    pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,

    #[arg(long)]
    case_sensitive: bool,

    #[arg(long)]
    whole_words: bool,

    #[arg(long)]
    ignore_whitespace: bool,

    /// Let `.` match line breaks
    #[arg(long)]
    dot_all: bool,

    /// Match canonically equivalent Unicode sequences
    #[arg(long)]
    canonical: bool,

    /// Search XML structure instead of raw text
    #[arg(long)]
    xml: bool,

    /// Restrict XML search to these node kinds
    #[arg(long = "content-type", value_name = "TYPE")]
    content_types: Vec<ContentType>,

    /// Restrict XML search to nodes under this XPath
    #[arg(long)]
    xpath: Option<String>,

    /// Search a single resource
    #[arg(long, conflicts_with = "directory", required_unless_present = "directory")]
    resource: Option<String>,

    /// Also search the resource's dependencies
    #[arg(long, requires = "resource")]
    with_deps: bool,

    /// Only follow explicit dependencies
    #[arg(long, requires = "with_deps")]
    explicit_only: bool,

    /// Search a directory
    #[arg(long)]
    directory: Option<String>,

    /// Include subdirectories
    #[arg(long, requires = "directory")]
    recursive: bool,
}

impl QueryArgs {
    fn forms(&self) -> (CriteriaForm, ScopeForm) {
        let criteria = CriteriaForm {
            pattern: self.pattern.clone(),
            is_regex: self.regex,
            case_sensitive: self.case_sensitive,
            whole_words_only: self.whole_words,
            ignore_whitespace: self.ignore_whitespace,
            dot_matches_all: self.dot_all,
            canonical_equivalence: self.canonical,
            xml_aware: self.xml,
            content_types: self.content_types.iter().copied().collect(),
            xpath_restriction: self.xpath.clone().unwrap_or_default(),
        };

        let context_type = if self.directory.is_some() {
            ContextType::Directory
        } else if self.with_deps {
            ContextType::ResourceWithDependencies
        } else {
            ContextType::SingleResource
        };
        let scope = ScopeForm {
            context_type,
            resource_id: self.resource.clone(),
            explicit_only: self.explicit_only,
            directory_id: self.directory.clone(),
            recursive: self.recursive,
        };

        (criteria, scope)
    }
}

fn init_logging(verbose: u8) -> Result<MultiProgress> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .build();
    let level = logger.filter();

    // Route log lines through the progress bar so they do not tear it
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger)
        .try_init()
        .context("Failed to initialize logger")?;
    log::set_max_level(level);
    Ok(multi)
}

async fn run_search(
    client: &SearchStreamClient,
    request: SearchRequest,
    multi: &MultiProgress,
    color: ColorChoice,
    export_dir: Option<&Path>,
) -> Result<ExitCode> {
    let mut stream = client.execute_search(&request);

    // Ctrl-C cancels the session; the stream then ends silently
    let cancel = stream.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut renderer = Renderer::new(color, multi);
    let mut results = SearchResults::new();
    results.start();

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                renderer.event(&event)?;
                results.apply(&event);
            }
            Err(err) => results.fail(err),
        }
    }
    if stream.is_cancelled() {
        results.cancel();
    }
    renderer.finish(&results)?;

    match &results.status {
        SearchStatus::Completed(_) => Ok(ExitCode::SUCCESS),
        SearchStatus::Failed(err) if err.wants_csv_export() => match export_dir {
            Some(dir) => {
                info!("Falling back to CSV export");
                let export = match err.csv_fallback() {
                    Some(url) => client.export_csv_from(url, &request).await,
                    None => client.export_csv(&request).await,
                };
                let export = export.context("CSV export failed")?;
                let path = export.write_to(dir)?;
                println!("Complete results written to {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Re-run with --export-on-threshold <DIR> or use `findstream export`.");
                Ok(ExitCode::FAILURE)
            }
        },
        _ => Ok(ExitCode::FAILURE),
    }
}

async fn run_export(
    client: &SearchStreamClient,
    request: SearchRequest,
    output: &Path,
    color: ColorChoice,
) -> Result<ExitCode> {
    match client.export_csv(&request).await {
        Ok(export) => {
            let path = export.write_to(output)?;
            println!("Exported {} bytes to {}", export.content.len(), path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            render::write_error(&mut StandardStream::stderr(color), &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let multi = init_logging(cli.verbose)?;

    let workspace = env::current_dir().context("Failed to get current directory")?;
    let config_manager = ConfigManager::new(Some(&workspace))?
        .with_env()
        .with_overrides(cli.server.clone(), None);
    debug!("Effective config: {:?}", config_manager.config());

    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Commands::Search {
            query,
            export_on_threshold,
        } => {
            let (criteria, scope) = query.forms();
            let request = build_search_request(&criteria, &scope)?;
            let client = SearchStreamClient::new(ClientSettings::from_config(config_manager.config()))?;
            run_search(&client, request, &multi, color, export_on_threshold.as_deref()).await
        }
        Commands::Export { query, output } => {
            let (criteria, scope) = query.forms();
            let request = build_export_request(&criteria, &scope)?;
            let client = SearchStreamClient::new(ClientSettings::from_config(config_manager.config()))?;
            run_export(&client, request, &output, color).await
        }
        Commands::Config => {
            println!("Global config: {}", config_manager.global_config_path.display());
            if let Some(local) = &config_manager.local_config_path {
                let state = if local.exists() { "" } else { " (not present)" };
                println!("Local config:  {}{}", local.display(), state);
            }
            println!();
            let mut shown = config_manager.config().clone();
            if shown.token.is_some() {
                shown.token = Some("********".to_string());
            }
            print!(
                "{}",
                toml::to_string_pretty(&shown).context("Failed to serialize config")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
