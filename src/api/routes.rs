use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::stats::{summarize, SummaryResponse};
use crate::db::models::format_ts;
use crate::db::ProspectStore;
use crate::drafting::{DeliverableSpec, DraftingClient, EmailDraft};
use crate::error::AppError;
use crate::types::{PipelineEntry, PipelineStatus, Prospect};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ProspectStore>,
    /// `None` when no LLM key is configured; drafting routes answer 503.
    pub drafting: Option<DraftingClient>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/prospects", get(get_prospects))
        .route("/prospects/:id", get(get_prospect))
        .route("/pipeline", get(get_pipeline).post(post_pipeline))
        .route("/export/prospects", get(export_prospects))
        .route("/stats/summary", get(get_stats_summary))
        .route("/drafts/email", post(post_email_draft))
        .route("/drafts/deliverable-spec", post(post_deliverable_spec))
        .route("/ingest", get(ingest_disabled).post(ingest_disabled))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

/// Raw strings: malformed numbers are ignored rather than rejected.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectsQuery {
    pub min_score: Option<String>,
    pub category: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize)]
pub struct PipelineQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectDetail {
    pub prospect: Prospect,
    pub pipeline_entry: Option<PipelineEntry>,
}

// ---------------------------------------------------------------------------
// Request body helpers
// ---------------------------------------------------------------------------

fn body_str(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn body_f64(body: &Value, key: &str) -> Option<f64> {
    body.get(key).and_then(Value::as_f64)
}

fn require_prospect_id(body: &Value) -> Result<String, AppError> {
    body_str(body, "prospectId")
        .ok_or_else(|| AppError::BadRequest("prospectId is required".to_string()))
}

/// Parse a request body as JSON regardless of its content type.
fn json_body(bytes: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

async fn load_prospect(state: &ApiState, id: &str) -> Result<Prospect, AppError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Prospect not found".to_string()))
}

fn drafting_client(state: &ApiState) -> Result<&DraftingClient, AppError> {
    state
        .drafting
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("ANTHROPIC_API_KEY not configured".to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_prospects(
    State(state): State<ApiState>,
    Query(params): Query<ProspectsQuery>,
) -> Result<Json<Vec<Prospect>>, AppError> {
    let mut list = state.store.read_all().await?;

    if let Some(min) = params.min_score.as_deref().and_then(|s| s.trim().parse::<f64>().ok()) {
        list.retain(|p| p.pain_score >= min);
    }
    if let Some(category) = params.category.as_deref().filter(|c| !c.is_empty()) {
        let wanted = category.to_lowercase();
        list.retain(|p| p.category.to_lowercase() == wanted);
    }
    if let Some(limit) = params
        .limit
        .as_deref()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
    {
        list.truncate(limit);
    }

    Ok(Json(list))
}

async fn get_prospect(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ProspectDetail>, AppError> {
    let prospect = load_prospect(&state, &id).await?;
    let pipeline_entry = state.store.get_pipeline_entry(&id).await?;
    Ok(Json(ProspectDetail {
        prospect,
        pipeline_entry,
    }))
}

async fn get_pipeline(
    State(state): State<ApiState>,
    Query(params): Query<PipelineQuery>,
) -> Result<Json<Vec<PipelineEntry>>, AppError> {
    let mut list = state.store.read_pipeline_all().await?;
    if let Some(status) = params.status.as_deref().and_then(PipelineStatus::parse) {
        list.retain(|e| e.status == status);
    }
    Ok(Json(list))
}

async fn post_pipeline(
    State(state): State<ApiState>,
    bytes: Bytes,
) -> Result<Json<PipelineEntry>, AppError> {
    let body = json_body(&bytes)?;
    let prospect_id = require_prospect_id(&body)?;
    let entry = PipelineEntry {
        status: PipelineStatus::parse_or_default(body.get("status").and_then(Value::as_str)),
        contacted_at: body_str(&body, "contactedAt"),
        notes: body_str(&body, "notes"),
        follow_up_at: body_str(&body, "followUpAt"),
        estimated_value: body_f64(&body, "estimatedValue"),
        revenue: body_f64(&body, "revenue"),
        updated_at: Utc::now(),
        prospect_id,
    };
    state.store.upsert_pipeline_entry(&entry).await?;
    info!(prospect_id = %entry.prospect_id, status = %entry.status, "pipeline entry updated");
    Ok(Json(entry))
}

/// JS-style number rendering: integral values print without a fraction.
fn csv_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

fn csv_quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn prospects_csv(prospects: &[Prospect]) -> String {
    let mut lines = vec![
        "id,name,slug,category,tvl,mcap,painScore,treasuryGated,signals,lastUpdated".to_string(),
    ];
    for p in prospects {
        let signals = p
            .pain_signals
            .iter()
            .map(|s| format!("{}:{}", s.key, csv_number(s.points)))
            .collect::<Vec<_>>()
            .join("; ");
        lines.push(
            [
                p.id.clone(),
                csv_quoted(&p.name),
                p.slug.clone(),
                csv_quoted(&p.category),
                csv_number(p.tvl),
                p.mcap.map(csv_number).unwrap_or_default(),
                csv_number(p.pain_score),
                if p.treasury_gated { "1" } else { "0" }.to_string(),
                csv_quoted(&signals),
                format_ts(&p.last_updated),
            ]
            .join(","),
        );
    }
    lines.join("\n")
}

async fn export_prospects(
    State(state): State<ApiState>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let prospects = state.store.read_all().await?;
    if params.format.as_deref() != Some("csv") {
        return Ok(Json(prospects).into_response());
    }
    let disposition = format!(
        "attachment; filename=\"prospects-{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        prospects_csv(&prospects),
    )
        .into_response())
}

async fn get_stats_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let (prospects, pipeline) =
        tokio::try_join!(state.store.read_all(), state.store.read_pipeline_all())?;
    Ok(Json(summarize(&prospects, &pipeline)))
}

async fn post_email_draft(
    State(state): State<ApiState>,
    bytes: Bytes,
) -> Result<Json<EmailDraft>, AppError> {
    let body = json_body(&bytes)?;
    let prospect_id = require_prospect_id(&body)?;
    let prospect = load_prospect(&state, &prospect_id).await?;
    let client = drafting_client(&state)?;
    Ok(Json(client.email_draft(&prospect).await?))
}

/// Title precedence: explicit `deliverableTitle`, then the recommendation
/// matching `deliverableId`, then the id itself, then a generic title.
fn deliverable_title(body: &Value, prospect: &Prospect) -> String {
    if let Some(title) = body_str(body, "deliverableTitle") {
        return title;
    }
    match body_str(body, "deliverableId") {
        Some(id) => prospect
            .deliverable_recommendations
            .iter()
            .find(|r| r.deliverable_id.label() == id)
            .map(|r| r.title.clone())
            .unwrap_or(id),
        None => "Custom dashboard".to_string(),
    }
}

async fn post_deliverable_spec(
    State(state): State<ApiState>,
    bytes: Bytes,
) -> Result<Json<DeliverableSpec>, AppError> {
    let body = json_body(&bytes)?;
    let prospect_id = require_prospect_id(&body)?;
    let prospect = load_prospect(&state, &prospect_id).await?;
    let title = deliverable_title(&body, &prospect);
    let client = drafting_client(&state)?;
    Ok(Json(client.deliverable_spec(&prospect, &title).await?))
}

async fn ingest_disabled() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": "Ingestion is disabled on this host. Run the `ingest` binary from a scheduler instead."
        })),
    )
}
