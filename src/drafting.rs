//! Outreach drafting through the Anthropic Messages API. Each call forces a
//! single tool invocation so the reply arrives as structured JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{Config, DRAFTING_MAX_TOKENS, DRAFTING_MODEL};
use crate::error::{AppError, Result};
use crate::fetcher::summarize_body;
use crate::types::Prospect;

const PROVIDER: &str = "Anthropic messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const EMAIL_TOOL: &str = "submit_email_draft";
const SPEC_TOOL: &str = "submit_deliverable_spec";

const NO_DRAFT: &str = "Could not generate draft.";
const NO_VALUE: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDraft {
    pub email_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableSpec {
    pub spec: String,
    pub tech_stack: String,
    pub hours: String,
    pub price_range: String,
    pub proof_of_work_paragraph: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { name: String, input: Value },
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Prompt context: identity, size, and the signals that argue for outreach.
pub fn prospect_context(p: &Prospect) -> String {
    let signals: Vec<String> = p
        .pain_signals
        .iter()
        .filter(|s| s.points > 0.0)
        .map(|s| format!("- {}: {}", s.key, s.explanation))
        .collect();
    format!(
        "Project: {}\nCategory: {}\nTVL: ${:.2}M\nPain signals:\n{}",
        p.name,
        p.category,
        p.tvl / 1e6,
        signals.join("\n")
    )
}

fn email_tool() -> Value {
    json!({
        "name": EMAIL_TOOL,
        "description": "Submit the final outreach email draft.",
        "input_schema": {
            "type": "object",
            "properties": {
                "emailBody": {"type": "string", "description": "The email body text (2-4 sentences)."},
                "subject": {"type": "string", "description": "Optional subject line."}
            },
            "required": ["emailBody"],
            "additionalProperties": false
        }
    })
}

fn spec_tool() -> Value {
    json!({
        "name": SPEC_TOOL,
        "description": "Submit the deliverable spec and proof-of-work paragraph.",
        "input_schema": {
            "type": "object",
            "properties": {
                "techStack": {"type": "string", "description": "e.g. React, Streamlit, Python"},
                "hours": {"type": "string", "description": "Estimated build hours (number as string)"},
                "priceRange": {"type": "string", "description": "e.g. $2,500-$5,000"},
                "proofOfWorkParagraph": {"type": "string", "description": "2-4 sentence proof-of-work email paragraph"}
            },
            "required": ["techStack", "hours", "priceRange", "proofOfWorkParagraph"],
            "additionalProperties": false
        }
    })
}

fn str_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct DraftingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DraftingClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Option<Self> {
        cfg.anthropic_api_key
            .as_ref()
            .map(|key| Self::new(http, cfg.anthropic_url.clone(), key.clone()))
    }

    async fn call_tool(
        &self,
        system: &str,
        prompt: String,
        tool: Value,
        tool_name: &str,
    ) -> Result<Vec<ContentBlock>> {
        let body = json!({
            "model": DRAFTING_MODEL,
            "max_tokens": DRAFTING_MAX_TOKENS,
            "system": system,
            "tools": [tool],
            "tool_choice": {"type": "tool", "name": tool_name},
            "messages": [{"role": "user", "content": prompt}]
        });
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                body: summarize_body(&text),
            });
        }
        let parsed: MessagesResponse = resp.json().await?;
        debug!(tool_name, blocks = parsed.content.len(), "drafting response received");
        Ok(parsed.content)
    }

    /// Short cold outreach email citing one pain signal.
    pub async fn email_draft(&self, prospect: &Prospect) -> Result<EmailDraft> {
        let prompt = format!(
            "Using this prospect context, write ONE short outreach email (2-4 sentences). The email should:\n\
             1. Cite one specific pain signal from the list that fits this project.\n\
             2. Include a placeholder like \"[Link to 30-min proof-of-work: e.g. Figma wireframe / Loom / data insight]\" for the Tier 1 Hook.\n\
             3. End with a soft pitch for a full interactive dashboard.\n\n\
             Prospect context:\n{}\n\n\
             Call the {EMAIL_TOOL} tool with your email body (and optional subject).",
            prospect_context(prospect)
        );
        let content = self
            .call_tool(
                "You are a freelance financial dashboard consultant. Write a short, professional cold outreach email.",
                prompt,
                email_tool(),
                EMAIL_TOOL,
            )
            .await?;
        Ok(email_from_content(content))
    }

    /// Tech stack, hours, price, and a proof-of-work paragraph for one deliverable.
    pub async fn deliverable_spec(
        &self,
        prospect: &Prospect,
        deliverable_title: &str,
    ) -> Result<DeliverableSpec> {
        let prompt = format!(
            "Prospect context:\n{}\n\nDeliverable type: {deliverable_title}\n\n\
             Suggest: (1) tech stack, (2) estimated build hours, (3) suggested price range, \
             (4) one short paragraph (2-4 sentences) for a \"proof of work\" email template \
             personalized to this project and deliverable. Call the {SPEC_TOOL} tool with these four fields.",
            prospect_context(prospect)
        );
        let content = self
            .call_tool(
                "You are a freelance financial dashboard consultant. Output structured deliverable specs.",
                prompt,
                spec_tool(),
                SPEC_TOOL,
            )
            .await?;
        Ok(spec_from_content(content))
    }
}

fn email_from_content(content: Vec<ContentBlock>) -> EmailDraft {
    let mut fallback_text = None;
    for block in content {
        match block {
            ContentBlock::ToolUse { name, input } if name == EMAIL_TOOL => {
                return EmailDraft {
                    email_body: str_field(&input, "emailBody")
                        .unwrap_or_else(|| NO_DRAFT.to_string()),
                    subject: str_field(&input, "subject"),
                };
            }
            ContentBlock::Text { text } if fallback_text.is_none() => fallback_text = Some(text),
            _ => {}
        }
    }
    warn!("email draft came back without tool output");
    EmailDraft {
        email_body: fallback_text.unwrap_or_else(|| NO_DRAFT.to_string()),
        subject: None,
    }
}

fn spec_from_content(content: Vec<ContentBlock>) -> DeliverableSpec {
    let tool_input = content.into_iter().find_map(|block| match block {
        ContentBlock::ToolUse { name, input } if name == SPEC_TOOL => Some(input),
        _ => None,
    });
    match tool_input {
        Some(input) => DeliverableSpec {
            spec: String::new(),
            tech_stack: str_field(&input, "techStack").unwrap_or_else(|| NO_VALUE.to_string()),
            hours: str_field(&input, "hours").unwrap_or_else(|| NO_VALUE.to_string()),
            price_range: str_field(&input, "priceRange").unwrap_or_else(|| NO_VALUE.to_string()),
            proof_of_work_paragraph: str_field(&input, "proofOfWorkParagraph").unwrap_or_default(),
        },
        None => {
            warn!("deliverable spec came back without tool output");
            DeliverableSpec {
                spec: String::new(),
                tech_stack: NO_VALUE.to_string(),
                hours: NO_VALUE.to_string(),
                price_range: NO_VALUE.to_string(),
                proof_of_work_paragraph: "Structured output unavailable.".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::prospect;
    use crate::fetcher::{http_client, stub};
    use crate::types::{PainSignal, SignalKey};
    use axum::{
        http::HeaderMap, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
    };

    fn sample() -> Prospect {
        let mut p = prospect("dl-alpha", 6.0);
        p.name = "Alpha".to_string();
        p.tvl = 42_500_000.0;
        p.pain_signals = vec![
            PainSignal {
                key: SignalKey::MultiChain,
                points: 4.0,
                explanation: "Deployed on 3 chains".to_string(),
            },
            PainSignal {
                key: SignalKey::DeadRepo,
                points: -5.0,
                explanation: "No commits".to_string(),
            },
        ];
        p
    }

    #[test]
    fn context_lists_only_positive_signals() {
        let ctx = prospect_context(&sample());
        assert!(ctx.starts_with("Project: Alpha\nCategory: Dexes\nTVL: $42.50M"));
        assert!(ctx.contains("- Multi-chain: Deployed on 3 chains"));
        assert!(!ctx.contains("Dead Repo"));
    }

    #[test]
    fn email_falls_back_to_text_then_placeholder() {
        let from_text = email_from_content(vec![ContentBlock::Text {
            text: "plain reply".to_string(),
        }]);
        assert_eq!(from_text.email_body, "plain reply");
        assert_eq!(email_from_content(vec![ContentBlock::Other]).email_body, NO_DRAFT);
    }

    #[test]
    fn spec_without_tool_output_is_placeholder() {
        let spec = spec_from_content(vec![]);
        assert_eq!(spec.tech_stack, NO_VALUE);
        assert_eq!(spec.proof_of_work_paragraph, "Structured output unavailable.");
    }

    #[tokio::test]
    async fn email_draft_reads_forced_tool_call() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("k") {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                assert_eq!(body["tool_choice"]["name"], EMAIL_TOOL);
                Json(json!({
                    "content": [
                        {"type": "text", "text": "thinking out loud"},
                        {"type": "tool_use", "id": "t1", "name": EMAIL_TOOL,
                         "input": {"emailBody": "Hi Alpha team", "subject": "Treasury view"}}
                    ]
                }))
                .into_response()
            }),
        );
        let base = stub::serve(router).await;
        let client = DraftingClient::new(http_client().unwrap(), base, "k");
        let draft = client.email_draft(&sample()).await.unwrap();
        assert_eq!(
            draft,
            EmailDraft {
                email_body: "Hi Alpha team".to_string(),
                subject: Some("Treasury view".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn deliverable_spec_fills_missing_fields() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async {
                Json(json!({
                    "content": [{"type": "tool_use", "id": "t1", "name": SPEC_TOOL,
                                 "input": {"techStack": "Python", "hours": "8"}}]
                }))
            }),
        );
        let base = stub::serve(router).await;
        let client = DraftingClient::new(http_client().unwrap(), base, "k");
        let spec = client.deliverable_spec(&sample(), "Custom dashboard").await.unwrap();
        assert_eq!(spec.tech_stack, "Python");
        assert_eq!(spec.hours, "8");
        assert_eq!(spec.price_range, NO_VALUE);
        assert_eq!(spec.proof_of_work_paragraph, "");
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid x-api-key") }),
        );
        let base = stub::serve(router).await;
        let client = DraftingClient::new(http_client().unwrap(), base, "bad");
        let err = client.email_draft(&sample()).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 401, .. }));
    }

    #[test]
    fn client_requires_key() {
        assert!(DraftingClient::from_config(&Config::default(), http_client().unwrap()).is_none());
    }
}
