//! Generate Command
//!
//! Usage:
//!   dox generate -p "prompt" [-t blog] [--model gpt-4] [-o out.md] [--dry-run]
//!   dox generate -p @prompt.txt --provider claude --json
//!
//! Flags override `[generate]` config defaults. Ctrl-C cancels the request,
//! including any pending retry wait.

use serde_json::json;
use std::io;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::cache::CacheStatistics;
use crate::ai::generator::{
    CacheStatus, GenerateOptions, Generation, Generator, GeneratorConfig, resolve_prompt,
};
use crate::ai::prompt::{ContentType, enhance_prompt};
use crate::ai::provider::ProviderKind;
use crate::ai::tokenizer::{ModelInfo, TokenCounter, estimate_cost};
use crate::cli::Output;
use crate::config::{Config, ConfigLoader};
use crate::types::{DoxError, Result};

/// Parsed `dox generate` arguments
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub prompt: String,
    pub content_type: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub api_key: Option<String>,
    pub output: Option<PathBuf>,
    pub force: bool,
    pub no_cache: bool,
    pub no_enhance: bool,
    pub dry_run: bool,
    pub json: bool,
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let rt = Runtime::new()?;
    rt.block_on(execute(&config, args))
}

async fn execute(config: &Config, args: GenerateArgs) -> Result<()> {
    let output = Output::new(args.quiet || args.json);
    let options = build_options(config, &args)?;
    let generator_config = build_generator_config(config, &args, &options);

    if args.dry_run {
        return dry_run(&generator_config, &options, &args, &output).await;
    }

    if let Some(path) = &args.output
        && path.exists()
        && !args.force
    {
        return Err(DoxError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "output file already exists: {} (use --force to overwrite)",
                path.display()
            ),
        )));
    }

    let provider = generator_config.resolve_provider(&options);
    let model = options
        .model
        .clone()
        .unwrap_or_else(|| generator_config.model_for(provider));
    if args.verbose {
        output.info(&format!(
            "Generating {} content with {} model {}",
            options.content_type, provider, model
        ));
        output.info(&format!(
            "Temperature: {:.2}, Max tokens: {}",
            options.temperature, options.max_tokens
        ));
    }

    let generator = Generator::new(generator_config);
    let cancel = CancellationToken::new();
    let signal_guard = spawn_ctrl_c_handler(cancel.clone());

    let generation = generator
        .generate_detailed(&cancel, &args.prompt, &options)
        .await;
    signal_guard.abort();
    let generation = generation?;

    if generation.cache_status == CacheStatus::Hit {
        output.info("Using cached response (cache hit)");
    }

    if args.json {
        print_json(&generation, args.output.as_ref())?;
    }

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &generation.result.text).await?;
            output.success(&format!("Content saved to: {}", path.display()));
        }
        None if !args.json => output.content(&generation.result.text),
        None => {}
    }

    if args.verbose
        && let Some(stats) = generator.cache_statistics()
    {
        print_cache_stats(&output, &stats);
    }

    Ok(())
}

/// Merge config defaults with command-line overrides
fn build_options(config: &Config, args: &GenerateArgs) -> Result<GenerateOptions> {
    let mut options = GenerateOptions::from(&config.generate);

    if let Some(content_type) = &args.content_type {
        let content_type = ContentType::from(content_type.as_str());
        if !content_type.is_known() {
            return Err(DoxError::Config(format!(
                "Unknown content type '{}'. Valid values: {}",
                content_type,
                ContentType::KNOWN_TAGS.join(", ")
            )));
        }
        options.content_type = content_type;
    }
    if let Some(provider) = &args.provider {
        options.provider = Some(provider.parse::<ProviderKind>()?);
    }
    if args.model.is_some() {
        options.model = args.model.clone();
    }
    if let Some(max_tokens) = args.max_tokens {
        options.max_tokens = max_tokens;
    }
    if let Some(temperature) = args.temperature {
        options.temperature = temperature;
    }
    if args.no_enhance {
        options.enhance = false;
    }
    Ok(options)
}

fn build_generator_config(
    config: &Config,
    args: &GenerateArgs,
    options: &GenerateOptions,
) -> GeneratorConfig {
    let mut generator_config = GeneratorConfig::from(config);
    if args.no_cache {
        generator_config.cache = None;
    }
    if let Some(api_key) = &args.api_key {
        let provider = generator_config.resolve_provider(options);
        match provider {
            ProviderKind::OpenAi => generator_config.openai.api_key = Some(api_key.clone()),
            ProviderKind::Claude => generator_config.claude.api_key = Some(api_key.clone()),
        }
    }
    generator_config
}

/// Cancel `token` on Ctrl-C
fn spawn_ctrl_c_handler(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling generation");
            token.cancel();
        }
    })
}

/// Estimate tokens and cost without contacting any provider
async fn dry_run(
    generator_config: &GeneratorConfig,
    options: &GenerateOptions,
    args: &GenerateArgs,
    output: &Output,
) -> Result<()> {
    let prompt = resolve_prompt(&args.prompt).await?;
    let prompt = if options.enhance {
        enhance_prompt(&prompt, &options.content_type)
    } else {
        prompt
    };

    let provider = generator_config.resolve_provider(options);
    let model = options
        .model
        .clone()
        .unwrap_or_else(|| generator_config.model_for(provider));

    let prompt_tokens = TokenCounter::default().count(&prompt);
    let completion_tokens = options.max_tokens as usize;
    let estimate = estimate_cost(&model, prompt_tokens, completion_tokens);
    let model_info = ModelInfo::for_model(&model);

    if !model_info.fits_context(prompt_tokens) {
        output.warning(&format!(
            "Prompt exceeds model's context window ({} > {} tokens)",
            prompt_tokens, model_info.context_window
        ));
    }

    if args.json {
        let report = json!({
            "operation": "generate",
            "provider": provider,
            "model": model,
            "contentType": options.content_type,
            "temperature": options.temperature,
            "maxTokens": options.max_tokens,
            "estimatedTokens": {
                "prompt": estimate.prompt_tokens,
                "completion": estimate.completion_tokens,
                "total": estimate.total_tokens(),
            },
            "estimatedCost": {
                "amount": estimate.amount,
                "currency": estimate.currency,
            },
            "modelInfo": model_info,
            "outputFile": args.output,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output.section("Dry run");
    output.field("Operation", format!("Generate {} content", options.content_type));
    output.field("Provider", provider);
    println!();
    println!("{}", model_info);
    println!();
    println!("{}", estimate);
    if let Some(path) = &args.output {
        println!();
        output.info(&format!("Output will be saved to: {}", path.display()));
    }
    println!();
    output.info("No API calls were made. Remove --dry-run to execute.");
    Ok(())
}

fn print_json(generation: &Generation, output_file: Option<&PathBuf>) -> Result<()> {
    let result = &generation.result;
    let report = json!({
        "content": result.text,
        "provider": result.provider,
        "model": result.model,
        "completedAt": result.completed_at,
        "cacheStatus": generation.cache_status,
        "outputFile": output_file,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_cache_stats(output: &Output, stats: &CacheStatistics) {
    output.section("Cache statistics");
    output.field("Hits", stats.hits);
    output.field("Misses", stats.misses);
    output.field("Hit rate", format!("{:.1}%", stats.hit_rate()));
    output.field("Entries", format!("{}/{}", stats.entries, stats.max_entries));
    output.field("Size", format!("{} bytes", stats.bytes));
    output.field("Evictions", stats.evictions);
    output.field("Expirations", stats.expirations);
}
