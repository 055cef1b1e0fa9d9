use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use packfill::config::{FillMode, PackConfig};
use packfill::{
    browser, fill, AutoLoader, CdpPage, ConfigStore, FileStore, KvStore, LogFeedback,
};

#[derive(Parser)]
#[command(name = "packfill")]
#[command(about = "Auto-fill pack quantity inputs on a storefront page")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fill pass against the target page
    Fill {
        /// Page URL (falls back to the configured target URL)
        url: Option<String>,

        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Auto-scroll the page until it stops growing, then report input counts
    Load {
        /// Page URL (falls back to the configured target URL)
        url: Option<String>,

        #[command(flatten)]
        session: SessionArgs,

        /// Run a fill pass each time new content appears
        #[arg(long)]
        fill: bool,
    },

    /// Inspect or reset the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,
    /// Restore the configuration to its defaults
    Reset,
}

#[derive(Args)]
struct SessionArgs {
    /// Chrome debugging port to connect to
    #[arg(short, long, default_value_t = 9222)]
    port: u16,

    /// Launch a new headless Chrome instead of connecting
    #[arg(short, long)]
    launch: bool,
}

/// One-shot overrides merged onto the persisted configuration (and saved).
#[derive(Args)]
struct Overrides {
    /// Targeting mode: fixed, random or unlimited
    #[arg(long)]
    mode: Option<String>,

    /// Number of inputs to target in fixed/random modes
    #[arg(long)]
    count: Option<u32>,

    /// Quantity for the fixed strategy
    #[arg(long)]
    quantity: Option<u32>,

    /// Lower bound for the random/noise strategies
    #[arg(long)]
    min: Option<u32>,

    /// Upper bound for the random/noise strategies
    #[arg(long)]
    max: Option<u32>,

    /// Strategy name: fixed, random or noise
    #[arg(long)]
    pattern: Option<String>,

    /// Noise seed (omit for a clock-derived one)
    #[arg(long)]
    seed: Option<u64>,

    /// Zero every visible input before filling
    #[arg(long)]
    clear: bool,
}

impl Overrides {
    fn apply(self, cfg: &mut PackConfig) -> Result<()> {
        if let Some(mode) = self.mode {
            cfg.fill_mode = match mode.to_ascii_lowercase().as_str() {
                "fixed" => FillMode::Fixed,
                "random" => FillMode::Random,
                "unlimited" => FillMode::Unlimited,
                other => bail!("unknown mode '{other}' (expected fixed, random or unlimited)"),
            };
        }
        if let Some(count) = self.count {
            cfg.target_count = count;
        }
        if let Some(quantity) = self.quantity {
            cfg.fixed_quantity = quantity;
        }
        if let Some(min) = self.min {
            cfg.min_quantity = min;
        }
        if let Some(max) = self.max {
            cfg.max_quantity = max;
        }
        if let Some(pattern) = self.pattern {
            cfg.pattern_type = pattern;
        }
        if let Some(seed) = self.seed {
            cfg.noise_seed = Some(seed);
        }
        if self.clear {
            cfg.clear_before_fill = true;
        }
        cfg.validate();
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new());
    let config_store = ConfigStore::new(store);

    match cli.command {
        Commands::Fill {
            url,
            session,
            overrides,
        } => {
            let mut cfg = config_store.load();
            overrides.apply(&mut cfg)?;
            config_store.save(&cfg)?;
            let url = resolve_url(url, &cfg)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_fill_command(&url, &cfg, &session))
        }
        Commands::Load { url, session, fill } => {
            let mut cfg = config_store.load();
            cfg.auto_load = true;
            cfg.auto_fill_on_load = fill;
            let url = resolve_url(url, &cfg)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_load_command(&url, &cfg, &session))
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let cfg = config_store.load();
                println!("{}", serde_json::to_string_pretty(&cfg)?);
                Ok(())
            }
            ConfigAction::Reset => {
                config_store.save(&PackConfig::default())?;
                println!("configuration reset to defaults");
                Ok(())
            }
        },
    }
}

fn resolve_url(arg: Option<String>, cfg: &PackConfig) -> Result<String> {
    match arg.or_else(|| {
        (!cfg.target_url.is_empty()).then(|| cfg.target_url.clone())
    }) {
        Some(url) => Ok(url),
        None => bail!("no URL given and no target URL configured"),
    }
}

async fn run_fill_command(url: &str, cfg: &PackConfig, session: &SessionArgs) -> Result<()> {
    let browser = browser::session(session.launch, session.port).await?;
    let page = browser::open(&browser, url).await?;
    let page = CdpPage::new(page, &cfg.input_selector, cfg.load_more_selector.clone());

    match fill::run_fill(&page, cfg, &LogFeedback).await {
        Some(result) => println!(
            "filled {}/{} inputs, total quantity {}",
            result.filled_count, result.available_count, result.total_quantity_applied
        ),
        None => println!("nothing filled"),
    }
    Ok(())
}

async fn run_load_command(url: &str, cfg: &PackConfig, session: &SessionArgs) -> Result<()> {
    let browser = browser::session(session.launch, session.port).await?;
    let page = browser::open(&browser, url).await?;
    let page = CdpPage::new(page, &cfg.input_selector, cfg.load_more_selector.clone());

    let loader = AutoLoader::new(&page);
    let report = loader.run(cfg, &LogFeedback).await;
    info!(status = ?report.status, "load command finished");
    println!(
        "{:?} after {} attempts: {} -> {} inputs",
        report.status, report.attempts, report.inputs_before, report.inputs_after
    );
    Ok(())
}
