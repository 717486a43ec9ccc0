//! USD-per-million-token pricing tables and cost estimation.

/// Per-million-token USD rates for one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_create: f64,
}

const OPUS: ModelPricing = ModelPricing {
    input: 15.0,
    output: 75.0,
    cache_read: 1.5,
    cache_create: 18.75,
};

const SONNET: ModelPricing = ModelPricing {
    input: 3.0,
    output: 15.0,
    cache_read: 0.30,
    cache_create: 3.75,
};

const HAIKU_DEFAULT: ModelPricing = ModelPricing {
    input: 0.80,
    output: 4.0,
    cache_read: 0.08,
    cache_create: 1.0,
};

/// Resolve a model's pricing tier by substring match on the lower-cased
/// model string. Anything not matching `opus` or `sonnet` — including an
/// absent model name — falls back to the haiku/default tier.
pub fn pricing_for_model(model: Option<&str>) -> ModelPricing {
    let lower = model.unwrap_or_default().to_lowercase();
    if lower.contains("opus") {
        OPUS
    } else if lower.contains("sonnet") {
        SONNET
    } else {
        HAIKU_DEFAULT
    }
}

/// Estimate USD cost for a set of token counts, rounded to 2 decimals.
pub fn estimate_cost(
    input_tokens: i64,
    output_tokens: i64,
    cache_read: i64,
    cache_create: i64,
    model: Option<&str>,
) -> f64 {
    let rate = pricing_for_model(model);
    let cost = (input_tokens as f64 / 1_000_000.0) * rate.input
        + (output_tokens as f64 / 1_000_000.0) * rate.output
        + (cache_read as f64 / 1_000_000.0) * rate.cache_read
        + (cache_create as f64 / 1_000_000.0) * rate.cache_create;
    (cost * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_substring() {
        assert_eq!(pricing_for_model(Some("claude-opus-4-6")), OPUS);
        assert_eq!(pricing_for_model(Some("claude-3-5-sonnet")), SONNET);
        assert_eq!(pricing_for_model(Some("claude-haiku")), HAIKU_DEFAULT);
        assert_eq!(pricing_for_model(None), HAIKU_DEFAULT);
        assert_eq!(pricing_for_model(Some("unknown-model")), HAIKU_DEFAULT);
    }

    #[test]
    fn rounds_to_two_decimals() {
        // 1_000_000 input tokens at sonnet's $3/M is exactly $3.00.
        let cost = estimate_cost(1_000_000, 0, 0, 0, Some("sonnet"));
        assert_eq!(cost, 3.0);

        // Fractional cents round normally.
        let cost = estimate_cost(333_333, 0, 0, 0, Some("opus"));
        assert_eq!(cost, (333_333.0 / 1_000_000.0 * 15.0 * 100.0).round() / 100.0);
    }
}
