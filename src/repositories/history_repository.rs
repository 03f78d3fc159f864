use crate::models::{OptionSettlement, Settlement, StatusChange};
use sqlx::{PgConnection, PgPool, Result as SqlxResult};
use uuid::Uuid;

/// Repository for status history and settlement records
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    /// Create a new HistoryRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Status changes of a vote, oldest first
    pub async fn find_status_history(&self, vote_id: Uuid) -> SqlxResult<Vec<StatusChange>> {
        sqlx::query_as::<_, StatusChange>(
            r#"
            SELECT vote_id, status, changed_at
            FROM vote_status_history
            WHERE vote_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(vote_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find_settlement(&self, vote_id: Uuid) -> SqlxResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT vote_id, total_pool, winner_pool, winner_count,
                   distributed, fee_retained, settled_at
            FROM settlements
            WHERE vote_id = $1
            "#,
        )
        .bind(vote_id)
        .fetch_optional(&self.pool)
        .await?;

        let mut settlement = match settlement {
            Some(settlement) => settlement,
            None => return Ok(None),
        };
        settlement.options = sqlx::query_as::<_, OptionSettlement>(
            r#"
            SELECT s.option_id, s.correct_choice_id, s.option_pool, s.winner_pool,
                   s.winner_count, s.distributed, s.winner_odds
            FROM settlement_options s
            JOIN vote_options o ON o.id = s.option_id
            WHERE s.vote_id = $1
            ORDER BY o.position ASC
            "#,
        )
        .bind(vote_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(settlement))
    }

    pub async fn insert_status(conn: &mut PgConnection, change: &StatusChange) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vote_status_history (vote_id, status, changed_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(change.vote_id)
        .bind(change.status.as_str())
        .bind(change.changed_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_status_history(conn: &mut PgConnection, vote_id: Uuid) -> SqlxResult<()> {
        sqlx::query("DELETE FROM vote_status_history WHERE vote_id = $1")
            .bind(vote_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Insert a settlement; a second one for the same vote violates the key
    pub async fn insert_settlement(conn: &mut PgConnection, settlement: &Settlement) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlements (vote_id, total_pool, winner_pool, winner_count,
                                     distributed, fee_retained, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(settlement.vote_id)
        .bind(settlement.total_pool)
        .bind(settlement.winner_pool)
        .bind(settlement.winner_count)
        .bind(settlement.distributed)
        .bind(settlement.fee_retained)
        .bind(settlement.settled_at)
        .execute(&mut *conn)
        .await?;

        for option in &settlement.options {
            sqlx::query(
                r#"
                INSERT INTO settlement_options (vote_id, option_id, correct_choice_id,
                                                option_pool, winner_pool, winner_count,
                                                distributed, winner_odds)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(settlement.vote_id)
            .bind(option.option_id)
            .bind(option.correct_choice_id)
            .bind(option.option_pool)
            .bind(option.winner_pool)
            .bind(option.winner_count)
            .bind(option.distributed)
            .bind(option.winner_odds)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
