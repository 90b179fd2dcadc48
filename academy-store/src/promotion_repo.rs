use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use academy_catalog::Discount;
use academy_offer::{Promotion, PromotionStore};

pub struct PgPromotionRepository {
    pool: PgPool,
}

impl PgPromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    discount_kind: String,
    discount_value: i64,
    first_timer_only: bool,
    is_level_up: bool,
    valid_from: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    redemption_limit: Option<i32>,
    redemption_count: i32,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_kind.as_str() {
            "percentage" => Discount::percentage(row.discount_value)?,
            "amount" => Discount::amount(row.discount_value)?,
            other => return Err(format!("unknown discount kind {}", other).into()),
        };

        Ok(Promotion {
            id: row.id,
            code: row.code,
            description: row.description,
            discount,
            first_timer_only: row.first_timer_only,
            is_level_up: row.is_level_up,
            valid_from: row.valid_from,
            expires_at: row.expires_at,
            redemption_limit: row.redemption_limit,
            redemption_count: row.redemption_count,
        })
    }
}

const PROMOTION_COLUMNS: &str = "id, code, description, discount_kind, discount_value, first_timer_only, \
     is_level_up, valid_from, expires_at, redemption_limit, redemption_count";

#[async_trait]
impl PromotionStore for PgPromotionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Promotion>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, PromotionRow>(&format!(
            "SELECT {} FROM promotions WHERE id = $1",
            PROMOTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Promotion::try_from).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Promotion>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, PromotionRow>(&format!(
            "SELECT {} FROM promotions WHERE code = $1",
            PROMOTION_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Promotion::try_from).transpose()
    }
}
