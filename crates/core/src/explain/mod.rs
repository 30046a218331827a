pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::insight::Insight;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Deterministic template explanation. This is the default delivery path;
/// the LLM rewriter below only changes wording, never content.
pub fn template(insight: &Insight) -> String {
    let mut parts = vec![
        format!("**{}**", insight.title),
        String::new(),
        insight.description.clone(),
    ];

    if let Some(recommendation) = &insight.recommendation {
        parts.push(String::new());
        parts.push("**Recommendation:**".to_string());
        parts.push(recommendation.clone());
    }

    if !insight.metrics.is_empty() {
        parts.push(String::new());
        parts.push("**Key Metrics:**".to_string());
        for (name, value) in &insight.metrics {
            parts.push(format!("- {name}: {value}"));
        }
    }

    parts.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

/// One rewrite request: the full prioritized insight list for one report.
#[derive(Debug, Clone)]
pub struct RewriteInput {
    pub business_name: String,
    pub insights: Vec<Insight>,
}

impl RewriteInput {
    pub fn try_new(business_name: &str, insights: &[Insight]) -> anyhow::Result<Self> {
        ensure!(!insights.is_empty(), "nothing to rewrite: no insights");
        Ok(Self {
            business_name: business_name.to_string(),
            insights: insights.to_vec(),
        })
    }

    pub fn insights_json(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::to_value(&self.insights).context("failed to serialize insights for rewrite")
    }
}

/// Raw LLM output contract: one rewritten explanation per insight, matched
/// by zero-based index into the request's insight list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenExplanations {
    pub items: Vec<RewrittenItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenItem {
    pub index: usize,
    pub text: String,
}

impl RewrittenExplanations {
    /// Validate against the request and return texts in insight order.
    pub fn validate_into_texts(self, expected_len: usize) -> anyhow::Result<Vec<String>> {
        ensure!(
            self.items.len() == expected_len,
            "LLM output must contain exactly {expected_len} items (got {})",
            self.items.len()
        );

        let mut seen = BTreeSet::<usize>::new();
        let mut texts = vec![String::new(); expected_len];
        for item in self.items {
            ensure!(
                item.index < expected_len,
                "item index out of range: {}",
                item.index
            );
            ensure!(seen.insert(item.index), "duplicate item index: {}", item.index);

            let text = item.text.trim().to_string();
            ensure!(
                !text.is_empty(),
                "rewritten text for index {} must be non-empty",
                item.index
            );
            texts[item.index] = text;
        }
        Ok(texts)
    }
}

#[async_trait::async_trait]
pub trait ExplanationClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Rewrite the explanations for presentation. Returns one text per
    /// insight, in insight order.
    async fn rewrite_explanations(&self, input: RewriteInput) -> anyhow::Result<Vec<String>>;
}
