//! Static per-model token prices used for usage accounting.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (model prefix, input $/1M tokens, output $/1M tokens). Longest prefix first.
const PRICES_PER_MILLION: &[(&str, Decimal, Decimal)] = &[
    ("gpt-4o-mini", dec!(0.15), dec!(0.60)),
    ("gpt-4o", dec!(2.50), dec!(10.00)),
    ("gpt-4.1-mini", dec!(0.40), dec!(1.60)),
    ("gpt-4.1", dec!(2.00), dec!(8.00)),
    ("gpt-3.5-turbo", dec!(0.50), dec!(1.50)),
];

/// (input, output) cost per token for a model, or zero for unknown models.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let million = dec!(1000000);
    PRICES_PER_MILLION
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input / million, *output / million))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// Estimated USD cost of one call.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> Decimal {
    let (input, output) = model_cost(model);
    input * Decimal::from(input_tokens) + output * Decimal::from(output_tokens)
}
