//! Token usage and cost accounting for generative calls.
//!
//! [`CostTracker`] keeps a running total for the current run. It is shared by
//! reference between the summarization and chunking engines and reset at the
//! start of each run.

use crate::config::DEFAULT_MODEL;
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const PRICING: &[(&str, Pricing)] = &[
    ("gemini-2.5-flash", Pricing { input: 0.30, output: 2.50 }),
    ("gemini-2.5-pro", Pricing { input: 1.25, output: 10.00 }),
    ("gemini-3-flash", Pricing { input: 0.50, output: 3.00 }),
    ("gemma-3-27b-it", Pricing { input: 0.00, output: 0.00 }),
];

/// Price for a model, falling back to the default model's rate.
pub fn pricing_for(model: &str) -> Pricing {
    let lookup = |wanted: &str| {
        PRICING
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, p)| *p)
    };
    lookup(model)
        .or_else(|| lookup(DEFAULT_MODEL))
        .unwrap_or(Pricing { input: 0.0, output: 0.0 })
}

#[derive(Debug)]
struct Totals {
    input_tokens: u64,
    output_tokens: u64,
    model: String,
}

/// Snapshot of spend so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug)]
pub struct CostTracker {
    totals: Mutex<Totals>,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

impl CostTracker {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(Totals {
                input_tokens: 0,
                output_tokens: 0,
                model: DEFAULT_MODEL.to_string(),
            }),
        }
    }

    /// Add one call's token counts. The model named last is the one the
    /// report is priced at.
    pub fn track_usage(&self, input_tokens: u64, output_tokens: u64, model: &str) {
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.input_tokens += input_tokens;
        totals.output_tokens += output_tokens;
        totals.model = model.to_string();
        debug!(input_tokens, output_tokens, model, "Tracked token usage");
    }

    pub fn daily_cost(&self) -> CostReport {
        let (model, input_tokens, output_tokens) = {
            let totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
            (totals.model.clone(), totals.input_tokens, totals.output_tokens)
        };
        let prices = pricing_for(&model);
        let input_cost = input_tokens as f64 / 1_000_000.0 * prices.input;
        let output_cost = output_tokens as f64 / 1_000_000.0 * prices.output;
        CostReport {
            model,
            input_tokens,
            output_tokens,
            input_cost: round6(input_cost),
            output_cost: round6(output_cost),
            total_cost: round6(input_cost + output_cost),
        }
    }

    /// Zero the counters. The last model is kept.
    pub fn reset(&self) {
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.input_tokens = 0;
        totals.output_tokens = 0;
    }
}
