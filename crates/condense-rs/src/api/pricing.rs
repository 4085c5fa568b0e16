//! Approximate per-model pricing, used when the provider does not report
//! the cost of a summarization call.

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Estimate cost for given token counts.
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

/// Lookup approximate pricing for a model by name.
///
/// Matches on the segment after the last `/`, so an org prefix such as
/// `"my-org/custom-sonnet-finetune"` cannot cause a false match on the org.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    let (input, output) = if name.contains("opus") {
        (15.0, 75.0)
    } else if name.contains("sonnet") {
        (3.0, 15.0)
    } else if name.contains("haiku") {
        (0.80, 4.0)
    } else if name.contains("4o-mini") {
        (0.15, 0.60)
    } else if name.contains("gpt-4") {
        (2.50, 10.0)
    } else if name.contains("gemini") && name.contains("flash") {
        (0.30, 2.50)
    } else if name.contains("gemini") {
        (1.25, 10.0)
    } else if name.contains("deepseek") {
        (0.27, 1.10)
    } else {
        return ModelPricing::default();
    };
    ModelPricing {
        input_per_million: input,
        output_per_million: output,
    }
}
