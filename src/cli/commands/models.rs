//! Models Command
//!
//! Lists known models per provider with context limits and pricing.

use crate::ai::provider::ProviderKind;
use crate::ai::tokenizer::{ModelInfo, TokenPricing};
use crate::cli::Output;
use crate::types::Result;

pub fn run(provider: Option<&str>) -> Result<()> {
    let kinds = match provider {
        Some(name) => vec![name.parse::<ProviderKind>()?],
        None => ProviderKind::ALL.to_vec(),
    };

    let output = Output::default();
    for kind in kinds {
        output.section(&format!("{} models", kind));
        for model in kind.available_models() {
            let info = ModelInfo::for_model(model);
            let pricing = TokenPricing::for_model(model);
            let marker = if *model == kind.default_model() {
                " (default)"
            } else {
                ""
            };
            println!(
                "  {:<28} context {:>7}  max out {:>5}  ${:.2}/${:.2} per 1M{}",
                model,
                info.context_window,
                info.max_output,
                pricing.prompt,
                pricing.completion,
                marker
            );
        }
    }
    Ok(())
}
