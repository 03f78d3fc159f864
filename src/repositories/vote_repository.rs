use crate::models::{Choice, Vote, VoteOption};
use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool, Result as SqlxResult};
use uuid::Uuid;

const VOTE_COLUMNS: &str = r#"
    id, issue_id, title, status, cancellation_reason, fee_rate,
    total_points, total_participants, rewarded, end_at, created_at, updated_at
"#;

/// Repository for votes and the options and choices they own
pub struct VoteRepository {
    pool: PgPool,
}

impl VoteRepository {
    /// Create a new VoteRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ONGOING votes whose end time has passed, oldest deadline first
    pub async fn find_due_for_finish(&self, now: NaiveDateTime) -> SqlxResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM votes
            WHERE status = 'ONGOING' AND end_at <= $1
            ORDER BY end_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    /// RESOLVED votes that have not been rewarded yet
    pub async fn find_awaiting_settlement(&self) -> SqlxResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM votes
            WHERE status = 'RESOLVED' AND rewarded = FALSE
            ORDER BY updated_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find_all_ids(&self) -> SqlxResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM votes ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
    }

    /// Fetch a vote, optionally taking its row lock
    pub async fn fetch(conn: &mut PgConnection, id: Uuid, lock: bool) -> SqlxResult<Option<Vote>> {
        let sql = format!(
            "SELECT {} FROM votes WHERE id = $1{}",
            VOTE_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, Vote>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn fetch_options(
        conn: &mut PgConnection,
        vote_id: Uuid,
        lock: bool,
    ) -> SqlxResult<Vec<VoteOption>> {
        let sql = format!(
            r#"
            SELECT id, vote_id, title, position, points_total, participants_count,
                   correct_choice_id, created_at
            FROM vote_options
            WHERE vote_id = $1
            ORDER BY position ASC{}
            "#,
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, VoteOption>(&sql)
            .bind(vote_id)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn fetch_choices(
        conn: &mut PgConnection,
        vote_id: Uuid,
        lock: bool,
    ) -> SqlxResult<Vec<Choice>> {
        let sql = format!(
            r#"
            SELECT c.id, c.option_id, c.text, c.position, c.points_total, c.participants_count
            FROM vote_choices c
            JOIN vote_options o ON o.id = c.option_id
            WHERE o.vote_id = $1
            ORDER BY o.position ASC, c.position ASC{}
            "#,
            if lock { " FOR UPDATE OF c" } else { "" }
        );
        sqlx::query_as::<_, Choice>(&sql)
            .bind(vote_id)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn insert(conn: &mut PgConnection, vote: &Vote) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (id, issue_id, title, status, cancellation_reason, fee_rate,
                               total_points, total_participants, rewarded, end_at,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(vote.id)
        .bind(vote.issue_id)
        .bind(&vote.title)
        .bind(vote.status.as_str())
        .bind(&vote.cancellation_reason)
        .bind(vote.fee_rate)
        .bind(vote.total_points)
        .bind(vote.total_participants)
        .bind(vote.rewarded)
        .bind(vote.end_at)
        .bind(vote.created_at)
        .bind(vote.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Write status, reason, flags and counters
    pub async fn update(conn: &mut PgConnection, vote: &Vote) -> SqlxResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE votes
            SET status = $2,
                cancellation_reason = $3,
                total_points = $4,
                total_participants = $5,
                rewarded = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(vote.id)
        .bind(vote.status.as_str())
        .bind(&vote.cancellation_reason)
        .bind(vote.total_points)
        .bind(vote.total_participants)
        .bind(vote.rewarded)
        .bind(vote.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_option(conn: &mut PgConnection, option: &VoteOption) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vote_options (id, vote_id, title, position, points_total,
                                      participants_count, correct_choice_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(option.id)
        .bind(option.vote_id)
        .bind(&option.title)
        .bind(option.position)
        .bind(option.points_total)
        .bind(option.participants_count)
        .bind(option.correct_choice_id)
        .bind(option.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update_option(conn: &mut PgConnection, option: &VoteOption) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE vote_options
            SET points_total = $2, participants_count = $3, correct_choice_id = $4
            WHERE id = $1
            "#,
        )
        .bind(option.id)
        .bind(option.points_total)
        .bind(option.participants_count)
        .bind(option.correct_choice_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn insert_choice(conn: &mut PgConnection, choice: &Choice) -> SqlxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vote_choices (id, option_id, text, position, points_total, participants_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(choice.id)
        .bind(choice.option_id)
        .bind(&choice.text)
        .bind(choice.position)
        .bind(choice.points_total)
        .bind(choice.participants_count)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update_choice(conn: &mut PgConnection, choice: &Choice) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE vote_choices
            SET points_total = $2, participants_count = $3
            WHERE id = $1
            "#,
        )
        .bind(choice.id)
        .bind(choice.points_total)
        .bind(choice.participants_count)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Delete a vote's choices, then its options
    pub async fn delete_children(conn: &mut PgConnection, vote_id: Uuid) -> SqlxResult<()> {
        sqlx::query(
            r#"
            DELETE FROM vote_choices
            WHERE option_id IN (SELECT id FROM vote_options WHERE vote_id = $1)
            "#,
        )
        .bind(vote_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM vote_options WHERE vote_id = $1")
            .bind(vote_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut PgConnection, vote_id: Uuid) -> SqlxResult<u64> {
        let result = sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(vote_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
