//! Model pricing and token math used by the spend-cap guard.
//!
//! Rates are approximate list prices per 1K tokens and exist to keep the
//! ledger honest between provider invoices; they are not a billing source
//! of truth.

use rust_decimal::Decimal;

/// Per-1K-token rates (prompt, completion) at scale 5, so 0.03 USD is
/// `Decimal::new(3000, 5)`. Unknown models fall back to the most expensive
/// known rates so the cap errs on the side of blocking early.
fn model_rates(model: &str) -> (Decimal, Decimal) {
    match model {
        "gpt-4-turbo" => (Decimal::new(1000, 5), Decimal::new(3000, 5)),
        "gpt-3.5-turbo" => (Decimal::new(150, 5), Decimal::new(200, 5)),
        _ => (Decimal::new(3000, 5), Decimal::new(6000, 5)),
    }
}

/// Estimated cost of one LLM call.
pub fn estimate_call_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> Decimal {
    let (prompt_per_1k, completion_per_1k) = model_rates(model);

    let per_k = Decimal::new(1000, 0);
    let prompt_cost = Decimal::from(prompt_tokens) * prompt_per_1k / per_k;
    let completion_cost = Decimal::from(completion_tokens) * completion_per_1k / per_k;

    prompt_cost + completion_cost
}

/// Rough token estimate for display purposes: one token per four UTF-8
/// bytes, rounded up. Matches common English tokenizer averages closely
/// enough for the chat transcript view.
pub fn estimate_tokens(text: &str) -> u32 {
    let bytes = text.len();
    ((bytes + 3) / 4) as u32
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{estimate_call_cost, estimate_tokens};

    #[test]
    fn gpt4_rates_match_list_prices() {
        let cost = estimate_call_cost("gpt-4", 1000, 1000);
        assert_eq!(cost, Decimal::new(9, 2)); // 0.03 + 0.06
    }

    #[test]
    fn turbo_is_cheaper_than_gpt4() {
        let gpt4 = estimate_call_cost("gpt-4", 500, 500);
        let turbo = estimate_call_cost("gpt-3.5-turbo", 500, 500);
        assert!(turbo < gpt4);
    }

    #[test]
    fn unknown_model_uses_gpt4_rates() {
        assert_eq!(
            estimate_call_cost("experimental-model", 1000, 0),
            estimate_call_cost("gpt-4", 1000, 0)
        );
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(estimate_call_cost("gpt-4", 0, 0), Decimal::ZERO);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn token_estimate_counts_utf8_bytes() {
        // "é" is two bytes in UTF-8.
        assert_eq!(estimate_tokens("éééé"), 2);
    }
}
