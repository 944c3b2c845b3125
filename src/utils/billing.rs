use cyder_tools::log::debug;
use serde_json::Value;

use crate::database::model::Model;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

fn token_field(usage: &Value, key: &str) -> Option<i64> {
    usage.get(key).and_then(Value::as_i64)
}

fn usage_from(prompt: Option<i64>, completion: Option<i64>, total: Option<i64>) -> UsageInfo {
    let prompt_tokens = prompt.unwrap_or(0);
    let completion_tokens = completion.unwrap_or(0);
    UsageInfo {
        prompt_tokens,
        completion_tokens,
        total_tokens: total.unwrap_or(prompt_tokens + completion_tokens),
    }
}

/// Reads token counts from an upstream response body.
///
/// Understands the chat-completions `usage` object, the Responses API
/// `usage.{input_tokens,output_tokens}` variant and Gemini `usageMetadata`.
/// Returns `None` when the body carries no usage at all.
pub fn parse_usage_info(response_body: &Value) -> Option<UsageInfo> {
    if let Some(usage) = response_body.get("usage").filter(|u| u.is_object()) {
        if usage.get("prompt_tokens").is_some() || usage.get("completion_tokens").is_some() {
            return Some(usage_from(
                token_field(usage, "prompt_tokens"),
                token_field(usage, "completion_tokens"),
                token_field(usage, "total_tokens"),
            ));
        }
        if usage.get("input_tokens").is_some() || usage.get("output_tokens").is_some() {
            return Some(usage_from(
                token_field(usage, "input_tokens"),
                token_field(usage, "output_tokens"),
                token_field(usage, "total_tokens"),
            ));
        }
        return Some(usage_from(None, None, token_field(usage, "total_tokens")));
    }

    if let Some(usage) = response_body.get("usageMetadata").filter(|u| u.is_object()) {
        return Some(usage_from(
            token_field(usage, "promptTokenCount"),
            token_field(usage, "candidatesTokenCount"),
            token_field(usage, "totalTokenCount"),
        ));
    }

    None
}

/// Cost in balance subunits. Prices are per 1000 tokens; the sum is rounded once.
pub fn calculate_cost(usage_info: &UsageInfo, model: &Model) -> i64 {
    let prompt_part = usage_info.prompt_tokens as f64 / 1000.0 * model.input_token_price as f64;
    let completion_part = usage_info.completion_tokens as f64 / 1000.0 * model.output_token_price as f64;
    let cost = (prompt_part + completion_part).round() as i64;
    debug!(
        "[calculate_cost] model {} usage {:?} -> cost {}",
        model.name, usage_info, cost
    );
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn priced(input: i64, output: i64) -> Model {
        Model {
            name: "gpt-4:latest".to_string(),
            input_token_price: input,
            output_token_price: output,
            ..Default::default()
        }
    }

    #[test]
    fn openai_usage() {
        let body = json!({"usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150}});
        assert_eq!(
            parse_usage_info(&body),
            Some(UsageInfo { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 })
        );
    }

    #[test]
    fn responses_usage_derives_total() {
        let body = json!({"usage": {"input_tokens": 7, "output_tokens": 3}});
        assert_eq!(
            parse_usage_info(&body),
            Some(UsageInfo { prompt_tokens: 7, completion_tokens: 3, total_tokens: 10 })
        );
    }

    #[test]
    fn gemini_usage_metadata() {
        let body = json!({"usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 12}});
        assert_eq!(
            parse_usage_info(&body),
            Some(UsageInfo { prompt_tokens: 4, completion_tokens: 6, total_tokens: 12 })
        );
    }

    #[test]
    fn missing_or_null_usage() {
        assert_eq!(parse_usage_info(&json!({"id": "x"})), None);
        assert_eq!(parse_usage_info(&json!({"usage": null})), None);
    }

    #[test]
    fn cost_rounds_to_nearest_subunit() {
        let usage = UsageInfo { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 };
        assert_eq!(calculate_cost(&usage, &priced(10, 5)), 1);

        let usage = UsageInfo { prompt_tokens: 150, completion_tokens: 0, total_tokens: 150 };
        assert_eq!(calculate_cost(&usage, &priced(10, 0)), 2);
    }

    #[test]
    fn zero_tokens_or_free_model_cost_nothing() {
        assert_eq!(calculate_cost(&UsageInfo::default(), &priced(10, 5)), 0);
        let usage = UsageInfo { prompt_tokens: 1000, completion_tokens: 1000, total_tokens: 2000 };
        assert_eq!(calculate_cost(&usage, &priced(0, 0)), 0);
    }
}
