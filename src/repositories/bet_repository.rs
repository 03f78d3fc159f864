use crate::models::{Bet, BetRecord, VoteStatus};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Result as SqlxResult, Row};
use uuid::Uuid;

const BET_COLUMNS: &str = r#"
    id, vote_id, option_id, choice_id, user_id, points_bet,
    is_cancelled, reward_points, created_at, updated_at
"#;

/// Repository for bet data access
pub struct BetRepository {
    pool: PgPool,
}

impl BetRepository {
    /// Create a new BetRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a bet by UUID
    pub async fn find_by_id(&self, id: Uuid) -> SqlxResult<Option<Bet>> {
        let sql = format!("SELECT {} FROM bets WHERE id = $1", BET_COLUMNS);
        sqlx::query_as::<_, Bet>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find all bets of a user with their vote and choice
    pub async fn find_records_by_user(&self, user_id: Uuid) -> SqlxResult<Vec<BetRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                b.id, b.vote_id, b.option_id, b.choice_id, b.user_id, b.points_bet,
                b.is_cancelled, b.reward_points, b.created_at, b.updated_at,
                v.title AS vote_title,
                v.status AS vote_status,
                v.end_at AS vote_end_at,
                v.created_at AS vote_created_at,
                c.text AS choice_text,
                o.correct_choice_id
            FROM bets b
            JOIN votes v ON v.id = b.vote_id
            JOIN vote_options o ON o.id = b.option_id
            JOIN vote_choices c ON c.id = b.choice_id
            WHERE b.user_id = $1
            ORDER BY v.created_at DESC, b.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// All bets of a vote, active or not
    pub async fn fetch_by_vote(conn: &mut PgConnection, vote_id: Uuid) -> SqlxResult<Vec<Bet>> {
        let sql = format!(
            "SELECT {} FROM bets WHERE vote_id = $1 ORDER BY created_at ASC",
            BET_COLUMNS
        );
        sqlx::query_as::<_, Bet>(&sql)
            .bind(vote_id)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn count_by_vote(conn: &mut PgConnection, vote_id: Uuid) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bets WHERE vote_id = $1")
            .bind(vote_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Insert a new bet
    pub async fn insert(conn: &mut PgConnection, bet: &Bet) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bets (id, vote_id, option_id, choice_id, user_id, points_bet,
                              is_cancelled, reward_points, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(bet.id)
        .bind(bet.vote_id)
        .bind(bet.option_id)
        .bind(bet.choice_id)
        .bind(bet.user_id)
        .bind(bet.points_bet)
        .bind(bet.is_cancelled)
        .bind(bet.reward_points)
        .bind(bet.created_at)
        .bind(bet.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Write cancellation and reward state
    pub async fn update(conn: &mut PgConnection, bet: &Bet) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE bets
            SET is_cancelled = $2, reward_points = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(bet.id)
        .bind(bet.is_cancelled)
        .bind(bet.reward_points)
        .bind(bet.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> SqlxResult<BetRecord> {
    let status: String = row.try_get("vote_status")?;
    let vote_status = VoteStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
        index: "vote_status".to_string(),
        source: e.into(),
    })?;

    Ok(BetRecord {
        bet: Bet::from_row(row)?,
        vote_title: row.try_get("vote_title")?,
        vote_status,
        vote_end_at: row.try_get("vote_end_at")?,
        vote_created_at: row.try_get("vote_created_at")?,
        choice_text: row.try_get("choice_text")?,
        correct_choice_id: row.try_get("correct_choice_id")?,
    })
}
