use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "siteaudit", version, about = "Automated web site audit: crawl, check, compare, triage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit a site from the command line
    Audit(AuditArgs),
    /// Start the HTTP REST API server
    Serve(ServeArgs),
    /// List the pages discovery would audit
    Discover(DiscoverArgs),
    /// Compare two images and write a diff image
    Compare(CompareArgs),
    /// Manage visual baselines
    #[command(subcommand)]
    Baseline(BaselineCommand),
    /// Stop a pending or running run
    Stop(StopArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct AuditArgs {
    /// Base URL of the site
    pub url: String,

    /// Site name (defaults to the host name)
    #[arg(long)]
    pub name: Option<String>,

    /// Audit only these pages (absolute URLs or paths); repeatable
    #[arg(long = "page")]
    pub pages: Vec<String>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable the progress display
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Max concurrent runs
    #[arg(long, default_value = "3")]
    pub workers: usize,
}

#[derive(Args, Clone)]
pub struct DiscoverArgs {
    /// Base URL of the site
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct CompareArgs {
    /// Baseline image
    pub baseline: String,

    /// Current image
    pub current: String,

    /// Where to write the diff image
    #[arg(short, long)]
    pub output: Option<String>,

    /// Page-level pass threshold in percent (defaults to the configured value)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Per-pixel color threshold, 0..1 (defaults to the configured value)
    #[arg(long)]
    pub pixel_threshold: Option<f64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BaselineType {
    Screenshot,
    Manual,
    Figma,
}

#[derive(Subcommand, Clone)]
pub enum BaselineCommand {
    /// Register a baseline for a page
    Add(BaselineAddArgs),
    /// List baselines of a site
    List(BaselineListArgs),
    /// Deactivate a baseline
    Deactivate(BaselineDeactivateArgs),
}

#[derive(Args, Clone)]
pub struct BaselineAddArgs {
    /// Site base URL (the site is created if unknown)
    #[arg(long)]
    pub site: String,

    /// Page URL the baseline applies to
    #[arg(long)]
    pub page_url: String,

    #[arg(long = "type", value_enum, default_value = "manual")]
    pub kind: BaselineType,

    /// Image file for screenshot/manual baselines
    #[arg(long)]
    pub image: Option<String>,

    /// Figma file key
    #[arg(long)]
    pub file_key: Option<String>,

    /// Figma node id
    #[arg(long)]
    pub node_id: Option<String>,

    /// Figma access token (or figma.access_token in the config)
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,
}

#[derive(Args, Clone)]
pub struct BaselineListArgs {
    /// Site base URL
    #[arg(long)]
    pub site: String,

    /// Include deactivated baselines
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct BaselineDeactivateArgs {
    /// Baseline ID
    pub id: String,
}

#[derive(Args, Clone)]
pub struct StopArgs {
    /// Run ID to stop
    pub run_id: String,

    /// Ask a running API server instead of the local database
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
