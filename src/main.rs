use clap::Parser;
use siteaudit::cli::{self, commands::LogFormat, Commands};
use siteaudit::errors::AuditError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(!cli.no_color).init(),
    }
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            AuditError::Config(_) => 2,
            AuditError::Browser(_) => 3,
            AuditError::InvalidTarget(_) => 5,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: cli::Cli) -> Result<(), AuditError> {
    // Validation reads its own file; a broken --config must not block it
    let command = match cli.command {
        Commands::Validate(args) => return cli::validate::handle_validate(args).await,
        other => other,
    };
    let settings = cli::load_settings(cli.config.as_deref()).await?;
    match command {
        Commands::Audit(args) => cli::audit::handle_audit(args, settings).await,
        Commands::Serve(args) => cli::serve::handle_serve(args, settings).await,
        Commands::Discover(args) => cli::discover::handle_discover(args, settings).await,
        Commands::Compare(args) => cli::compare::handle_compare(args, settings).await,
        Commands::Baseline(command) => cli::baseline::handle_baseline(command, settings).await,
        Commands::Stop(args) => cli::stop::handle_stop(args, settings).await,
        Commands::Validate(args) => cli::validate::handle_validate(args).await,
    }
}
