use crate::application::advisor::{AdvisorGateway, ProviderId};
use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::Signal;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Language-model-driven strategy: renders the tick into a compact prompt,
/// asks the gateway for recommendations and maps them to signals.
///
/// Gateway failures (exhaustion, breaker, invalid responses) propagate as
/// errors, so the registry excludes this strategy's weight for the tick.
pub struct AdvisorStrategy {
    gateway: Arc<AdvisorGateway>,
    pinned: Option<ProviderId>,
}

impl AdvisorStrategy {
    pub fn new(gateway: Arc<AdvisorGateway>) -> Self {
        Self {
            gateway,
            pinned: None,
        }
    }

    pub fn pinned_to(mut self, provider: ProviderId) -> Self {
        self.pinned = Some(provider);
        self
    }

    fn render_prompt(data: &TickData) -> String {
        let mut prompt = String::from(
            "You are an equity trading advisor. Based on the market data below, \
             respond ONLY with JSON of the form \
             {\"recommendations\": [{\"symbol\": \"...\", \"decision\": \"buy|sell|hold\", \
             \"confidence\": 0.0, \"reasoning\": \"...\", \"price_target\": 0.0, \
             \"quantity\": 0}]}.\n\n",
        );

        let _ = writeln!(
            prompt,
            "Portfolio: equity ${:.2}, cash ${:.2}, {} open positions.",
            data.snapshot.equity.to_f64().unwrap_or(0.0),
            data.snapshot.cash.to_f64().unwrap_or(0.0),
            data.snapshot.positions.len()
        );

        let mut symbols: Vec<&String> = data.series.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let closes = &data.series[symbol];
            let tail: Vec<String> = closes
                .iter()
                .rev()
                .take(10)
                .rev()
                .map(|c| format!("{:.2}", c))
                .collect();
            let held = data.snapshot.position_quantity(symbol);
            let _ = writeln!(
                prompt,
                "{} recent closes: [{}], held quantity: {}",
                symbol,
                tail.join(", "),
                held
            );
        }

        prompt
    }
}

#[async_trait]
impl Strategy for AdvisorStrategy {
    fn name(&self) -> &str {
        "advisor"
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["symbol", "close", "portfolio"]
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>> {
        let prompt = Self::render_prompt(data);
        let report = self.gateway.advise(&prompt, self.pinned).await?;

        debug!(
            "AdvisorStrategy: {} produced {} recommendations",
            report.provider,
            report.recommendations.len()
        );

        let source = format!("advisor:{}", report.provider);
        let signals = report
            .recommendations
            .into_iter()
            .map(|rec| {
                let mut signal = Signal::new(rec.symbol, rec.decision, rec.confidence, &source);
                if let Some(reasoning) = rec.reasoning {
                    signal = signal.with_metadata("reasoning", reasoning);
                }
                if let Some(target) = rec.price_target {
                    signal = signal.with_metadata("price_target", format!("{:.2}", target));
                }
                signal
            })
            .collect();

        Ok(signals)
    }
}
