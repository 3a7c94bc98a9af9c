use crate::application::advisor::provider::ProviderId;
use crate::domain::errors::GatewayError;
use crate::domain::signal::SignalKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outbound chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatRequestMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequestMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletionRequest {
    pub fn user_prompt(model: impl Into<String>, prompt: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatRequestMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            max_tokens,
        }
    }
}

/// Provider response envelope: a sequence of choices carrying message
/// content.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

impl ChatCompletionResponse {
    pub fn content(&self) -> Result<&str, GatewayError> {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GatewayError::InvalidResponse {
                reason: "response carries no choices".to_string(),
            })
    }
}

/// One advisory recommendation after validation.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub symbol: String,
    pub decision: SignalKind,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub price_target: Option<f64>,
    pub quantity: Option<f64>,
}

/// Validated output of one gateway call.
#[derive(Debug, Clone)]
pub struct AdvisorReport {
    pub provider: ProviderId,
    pub model: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    recommendations: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    symbol: Option<String>,
    decision: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    price_target: Option<f64>,
    #[serde(default)]
    quantity: Option<f64>,
}

/// Parse advisor message content as a recommendations batch.
///
/// An unparseable batch rejects the whole response; a malformed item
/// (missing symbol, decision or confidence) rejects only that item.
pub fn parse_recommendations(content: &str) -> Result<Vec<Recommendation>, GatewayError> {
    let batch: RawBatch =
        serde_json::from_str(content).map_err(|e| GatewayError::InvalidResponse {
            reason: format!("content is not a recommendations batch: {}", e),
        })?;

    let mut accepted = Vec::with_capacity(batch.recommendations.len());
    for (index, value) in batch.recommendations.into_iter().enumerate() {
        match validate_item(value) {
            Some(rec) => accepted.push(rec),
            None => warn!("AdvisorGateway: dropping malformed recommendation #{}", index),
        }
    }
    Ok(accepted)
}

fn validate_item(value: serde_json::Value) -> Option<Recommendation> {
    let raw: RawRecommendation = serde_json::from_value(value).ok()?;

    let symbol = raw.symbol.filter(|s| !s.trim().is_empty())?;
    let decision = match raw.decision?.to_lowercase().as_str() {
        "buy" => SignalKind::Buy,
        "sell" => SignalKind::Sell,
        "hold" => SignalKind::Hold,
        _ => return None,
    };
    let confidence = raw.confidence?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    Some(Recommendation {
        symbol: symbol.to_uppercase(),
        decision,
        confidence,
        reasoning: raw.reasoning,
        price_target: raw.price_target,
        quantity: raw.quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_batch() {
        let content = r#"{
            "recommendations": [
                {"symbol": "aapl", "decision": "buy", "confidence": 0.8,
                 "reasoning": "momentum", "price_target": 150.0, "quantity": 10},
                {"symbol": "TSLA", "decision": "hold", "confidence": 0.5}
            ]
        }"#;

        let recs = parse_recommendations(content).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].symbol, "AAPL");
        assert_eq!(recs[0].decision, SignalKind::Buy);
        assert_eq!(recs[0].price_target, Some(150.0));
        assert!(recs[1].quantity.is_none());
    }

    #[test]
    fn test_malformed_item_dropped_not_batch() {
        let content = r#"{
            "recommendations": [
                {"symbol": "AAPL", "decision": "buy", "confidence": 0.8},
                {"decision": "buy", "confidence": 0.9},
                {"symbol": "MSFT", "decision": "short", "confidence": 0.9},
                {"symbol": "NVDA", "decision": "sell", "confidence": 1.4},
                {"symbol": "AMD", "decision": "sell", "confidence": 0.7}
            ]
        }"#;

        let recs = parse_recommendations(content).unwrap();
        let symbols: Vec<&str> = recs.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "AMD"]);
    }

    #[test]
    fn test_unparseable_batch_rejected() {
        let err = parse_recommendations("not json at all").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { .. }));

        let err = parse_recommendations(r#"{"advice": []}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { .. }));
    }

    #[test]
    fn test_envelope_content_extraction() {
        let envelope: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "{\"recommendations\": []}"}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.content().unwrap(), r#"{"recommendations": []}"#);

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(empty.content().is_err());
    }
}
