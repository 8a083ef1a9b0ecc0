use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dox::cli::commands::{config, generate, models};

#[derive(Parser)]
#[command(name = "dox")]
#[command(version, about = "AI content generation with retries and response caching")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file layered over global and project config
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate content from a prompt
    Generate {
        #[arg(long, short, help = "Prompt text, or @file to read it from a file")]
        prompt: String,
        #[arg(
            long = "type",
            short = 't',
            help = "Content type: blog, report, summary, email, proposal, code, custom"
        )]
        content_type: Option<String>,
        #[arg(long, help = "Model to use (provider is inferred from the name)")]
        model: Option<String>,
        #[arg(long, help = "Provider: openai, claude")]
        provider: Option<String>,
        #[arg(long, help = "Maximum tokens to generate")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature (0.0-1.0)")]
        temperature: Option<f32>,
        #[arg(long, help = "API key for the selected provider")]
        api_key: Option<String>,
        #[arg(long, short, help = "Write content to this file")]
        output: Option<PathBuf>,
        #[arg(long, help = "Overwrite an existing output file")]
        force: bool,
        #[arg(long, help = "Bypass the response cache")]
        no_cache: bool,
        #[arg(long, help = "Send the prompt without content-type instructions")]
        no_enhance: bool,
        #[arg(long = "dry-run", help = "Estimate tokens and cost, don't call the API")]
        dry_run: bool,
        #[arg(long, help = "Print results as JSON")]
        json: bool,
    },

    /// List known models
    Models {
        #[arg(long, help = "Only list models of this provider")]
        provider: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write the default global configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mdox encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            content_type,
            model,
            provider,
            max_tokens,
            temperature,
            api_key,
            output,
            force,
            no_cache,
            no_enhance,
            dry_run,
            json,
        } => {
            generate::run(generate::GenerateArgs {
                prompt,
                content_type,
                model,
                provider,
                max_tokens,
                temperature,
                api_key,
                output,
                force,
                no_cache,
                no_enhance,
                dry_run,
                json,
                config: cli.config,
                verbose: cli.verbose,
                quiet: cli.quiet,
            })?;
        }
        Commands::Models { provider } => {
            models::run(provider.as_deref())?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                config::show(cli.config.as_deref(), &format)?;
            }
            ConfigAction::Path => {
                config::path()?;
            }
            ConfigAction::Init { force } => {
                config::init(force)?;
            }
        },
    }

    Ok(())
}
