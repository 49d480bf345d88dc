use crate::core::models::session::TokenCounts;

/// Dollar rates per million tokens for one model family.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRates {
    pub family: &'static str,
    pub input_per_m: f64,
    pub output_per_m: f64,
    pub cache_create_per_m: f64,
    pub cache_read_per_m: f64,
}

/// Rates used for any model not in the table.
pub static SONNET_RATES: ModelRates = ModelRates {
    family: "claude-sonnet",
    input_per_m: 3.0,
    output_per_m: 15.0,
    cache_create_per_m: 3.75,
    cache_read_per_m: 0.30,
};

static RATE_TABLE: &[ModelRates] = &[
    ModelRates {
        family: "claude-haiku-4-5",
        input_per_m: 1.0,
        output_per_m: 5.0,
        cache_create_per_m: 1.25,
        cache_read_per_m: 0.10,
    },
    ModelRates {
        family: "claude-3-5-haiku",
        input_per_m: 0.80,
        output_per_m: 4.0,
        cache_create_per_m: 1.0,
        cache_read_per_m: 0.08,
    },
    ModelRates {
        family: "claude-sonnet-4-5",
        input_per_m: 3.0,
        output_per_m: 15.0,
        cache_create_per_m: 3.75,
        cache_read_per_m: 0.30,
    },
    ModelRates {
        family: "claude-sonnet-4",
        input_per_m: 3.0,
        output_per_m: 15.0,
        cache_create_per_m: 3.75,
        cache_read_per_m: 0.30,
    },
    ModelRates {
        family: "claude-opus-4-5",
        input_per_m: 5.0,
        output_per_m: 25.0,
        cache_create_per_m: 6.25,
        cache_read_per_m: 0.50,
    },
    ModelRates {
        family: "claude-opus-4-1",
        input_per_m: 15.0,
        output_per_m: 75.0,
        cache_create_per_m: 18.75,
        cache_read_per_m: 1.50,
    },
    ModelRates {
        family: "claude-opus-4",
        input_per_m: 15.0,
        output_per_m: 75.0,
        cache_create_per_m: 18.75,
        cache_read_per_m: 1.50,
    },
];

/// Strip provider prefixes and version/date suffixes from a model id.
///   "anthropic.claude-sonnet-4-5-v2:0" -> "claude-sonnet-4-5"
///   "claude-sonnet-4-5-20250929"       -> "claude-sonnet-4-5"
fn normalize_model(model: &str) -> &str {
    let mut name = model.strip_prefix("anthropic.").unwrap_or(model);

    if let Some(idx) = name.find([':', '@']) {
        name = &name[..idx];
    }
    if let Some(idx) = name.rfind("-v") {
        let tail = &name[idx + 2..];
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            name = &name[..idx];
        }
    }
    if let Some(idx) = name.rfind('-') {
        let tail = &name[idx + 1..];
        if tail.len() == 8 && tail.chars().all(|c| c.is_ascii_digit()) {
            name = &name[..idx];
        }
    }
    name
}

/// Look up rates for a model, or None if it isn't in the table.
pub fn lookup(model: &str) -> Option<&'static ModelRates> {
    let normalized = normalize_model(model);
    RATE_TABLE.iter().find(|r| r.family == normalized)
}

/// Rates for a model, falling back to Sonnet pricing.
pub fn rates_for(model: &str) -> &'static ModelRates {
    lookup(model).unwrap_or(&SONNET_RATES)
}

/// Estimated dollar cost of a set of token counts.
pub fn estimate_cost(rates: &ModelRates, counts: &TokenCounts) -> f64 {
    (counts.input_tokens as f64 * rates.input_per_m
        + counts.output_tokens as f64 * rates.output_per_m
        + counts.cache_creation_tokens as f64 * rates.cache_create_per_m
        + counts.cache_read_tokens as f64 * rates.cache_read_per_m)
        / 1_000_000.0
}
