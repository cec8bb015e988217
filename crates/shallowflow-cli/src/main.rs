use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use shallowflow_core::config::Config;
use shallowflow_core::fetch::HttpFetcher;
use shallowflow_page::manifest::SnippetManifest;
use shallowflow_page::previews::generate_previews;
use shallowflow_page::python::PythonLauncher;
use shallowflow_page::{ConsoleHost, Page, RunOutcome, SessionCell, SessionSettings, SimulationSpec};

#[derive(Parser)]
#[command(
    name = "shallowflow",
    about = "Run interactive simulation snippets against a live Python interpreter",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one snippet as a simulation block
    Run {
        /// Snippet URL or path
        snippet: String,

        /// Static preview shown until the first run
        #[arg(long)]
        preview: Option<String>,

        /// Print the rendered block as HTML
        #[arg(long)]
        html: bool,
    },

    /// Render every snippet in a directory to a preview artifact
    Previews {
        #[arg(long, default_value = "snippets")]
        snippets: PathBuf,

        #[arg(long, default_value = "previews")]
        out: PathBuf,
    },

    /// List the snippets in a directory as a manifest
    Snippets {
        #[arg(long, default_value = "snippets")]
        dir: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

fn build_session(config: &Config, fetcher: Arc<HttpFetcher>) -> Arc<SessionCell> {
    let session = Arc::new(SessionCell::new(
        Arc::new(PythonLauncher::from_config(&config.runtime())),
        fetcher,
        Arc::new(ConsoleHost),
        SessionSettings::from_config(config),
    ));

    let on_interrupt = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling interpreter calls");
            on_interrupt.cancel();
        }
    });
    session
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    shallowflow_core::logging::init(&config.logging(), cli.verbose)?;
    tracing::debug!(path = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            snippet,
            preview,
            html,
        } => {
            let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout()));
            let session = build_session(&config, fetcher.clone());
            let page = Page::new(session, fetcher, Arc::new(ConsoleHost), &config);

            let target = page.add_section().await;
            let block = page
                .create_simulation(SimulationSpec {
                    target,
                    code_url: snippet.clone(),
                    static_img_url: preview.unwrap_or_default(),
                })
                .await
                .ok_or_else(|| anyhow::anyhow!("could not create a block for {snippet}"))?;

            let outcome = block.run().await;
            if html {
                println!("{}", page.tree().lock().await.to_html(target));
            }
            match outcome {
                RunOutcome::RenderedInteractive => println!("Rendered interactive chart"),
                RunOutcome::RenderedImage => println!("Rendered image"),
                RunOutcome::NoArtifact => println!("Ran without producing a figure"),
                RunOutcome::Busy => println!("Block busy"),
                RunOutcome::ScriptError => anyhow::bail!("{snippet} raised an error"),
                RunOutcome::Failed(reason) => anyhow::bail!(reason),
            }
        }
        Commands::Previews { snippets, out } => {
            let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout()));
            let session = build_session(&config, fetcher).get_session().await?;
            let report = generate_previews(&session, &snippets, &out).await?;

            for path in &report.written {
                println!("  saved {}", path.display());
            }
            for (name, reason) in &report.skipped {
                println!("  skipped {name}: {reason}");
            }
            println!("Manifest saved to {}", report.manifest.display());
        }
        Commands::Snippets { dir } => {
            let manifest = SnippetManifest::scan(&dir).await?;
            println!("{}", serde_json::to_string(&manifest)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}
