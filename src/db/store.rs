use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{PipelineRow, ProspectRow};
use crate::error::Result;
use crate::types::{PipelineEntry, Prospect};

/// Persistence gateway for prospects and outreach pipeline state.
#[async_trait]
pub trait ProspectStore: Send + Sync {
    /// All prospects, highest pain score first.
    async fn read_all(&self) -> Result<Vec<Prospect>>;

    async fn get(&self, id: &str) -> Result<Option<Prospect>>;

    /// Full overwrite per id, all-or-nothing.
    async fn upsert_all(&self, records: &[Prospect]) -> Result<()>;

    async fn read_pipeline_all(&self) -> Result<Vec<PipelineEntry>>;

    async fn get_pipeline_entry(&self, prospect_id: &str) -> Result<Option<PipelineEntry>>;

    async fn upsert_pipeline_entry(&self, entry: &PipelineEntry) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate. In-memory databases get a single
    /// connection so every query sees the same data.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {url}");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ProspectStore for SqliteStore {
    async fn read_all(&self) -> Result<Vec<Prospect>> {
        let rows: Vec<ProspectRow> =
            sqlx::query_as("SELECT * FROM prospects ORDER BY pain_score DESC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ProspectRow::into_prospect).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Prospect>> {
        let row: Option<ProspectRow> = sqlx::query_as("SELECT * FROM prospects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProspectRow::into_prospect).transpose()
    }

    async fn upsert_all(&self, records: &[Prospect]) -> Result<()> {
        let rows = records
            .iter()
            .map(ProspectRow::from_prospect)
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        for r in &rows {
            sqlx::query(
                r#"
                INSERT INTO prospects (
                    id, name, slug, category, chains, tvl, tvl_change_1m,
                    mcap, volume, volume_mcap_ratio, ath_change_pct, price_change_7d,
                    github_activity, pain_score, pain_score_raw, pain_signals,
                    treasury_gated, score_jumped, deliverable_recommendations, sources,
                    last_updated, url_defillama, url_coingecko, url_twitter, url_discord
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    slug = excluded.slug,
                    category = excluded.category,
                    chains = excluded.chains,
                    tvl = excluded.tvl,
                    tvl_change_1m = excluded.tvl_change_1m,
                    mcap = excluded.mcap,
                    volume = excluded.volume,
                    volume_mcap_ratio = excluded.volume_mcap_ratio,
                    ath_change_pct = excluded.ath_change_pct,
                    price_change_7d = excluded.price_change_7d,
                    github_activity = excluded.github_activity,
                    pain_score = excluded.pain_score,
                    pain_score_raw = excluded.pain_score_raw,
                    pain_signals = excluded.pain_signals,
                    treasury_gated = excluded.treasury_gated,
                    score_jumped = excluded.score_jumped,
                    deliverable_recommendations = excluded.deliverable_recommendations,
                    sources = excluded.sources,
                    last_updated = excluded.last_updated,
                    url_defillama = excluded.url_defillama,
                    url_coingecko = excluded.url_coingecko,
                    url_twitter = excluded.url_twitter,
                    url_discord = excluded.url_discord
                "#,
            )
            .bind(&r.id)
            .bind(&r.name)
            .bind(&r.slug)
            .bind(&r.category)
            .bind(&r.chains)
            .bind(r.tvl)
            .bind(r.tvl_change_1m)
            .bind(r.mcap)
            .bind(r.volume)
            .bind(r.volume_mcap_ratio)
            .bind(r.ath_change_pct)
            .bind(r.price_change_7d)
            .bind(&r.github_activity)
            .bind(r.pain_score)
            .bind(r.pain_score_raw)
            .bind(&r.pain_signals)
            .bind(r.treasury_gated)
            .bind(r.score_jumped)
            .bind(&r.deliverable_recommendations)
            .bind(&r.sources)
            .bind(&r.last_updated)
            .bind(&r.url_defillama)
            .bind(&r.url_coingecko)
            .bind(&r.url_twitter)
            .bind(&r.url_discord)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn read_pipeline_all(&self) -> Result<Vec<PipelineEntry>> {
        let rows: Vec<PipelineRow> =
            sqlx::query_as("SELECT * FROM pipeline ORDER BY updated_at DESC, prospect_id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(PipelineRow::into_entry).collect()
    }

    async fn get_pipeline_entry(&self, prospect_id: &str) -> Result<Option<PipelineEntry>> {
        let row: Option<PipelineRow> =
            sqlx::query_as("SELECT * FROM pipeline WHERE prospect_id = ?")
                .bind(prospect_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(PipelineRow::into_entry).transpose()
    }

    async fn upsert_pipeline_entry(&self, entry: &PipelineEntry) -> Result<()> {
        let r = PipelineRow::from_entry(entry);
        sqlx::query(
            r#"
            INSERT INTO pipeline (
                prospect_id, status, contacted_at, notes, follow_up_at,
                estimated_value, revenue, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(prospect_id) DO UPDATE SET
                status = excluded.status,
                contacted_at = excluded.contacted_at,
                notes = excluded.notes,
                follow_up_at = excluded.follow_up_at,
                estimated_value = excluded.estimated_value,
                revenue = excluded.revenue,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&r.prospect_id)
        .bind(&r.status)
        .bind(&r.contacted_at)
        .bind(&r.notes)
        .bind(&r.follow_up_at)
        .bind(r.estimated_value)
        .bind(r.revenue)
        .bind(&r.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
