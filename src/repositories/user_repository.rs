use crate::models::User;
use sqlx::{PgConnection, PgPool, Result as SqlxResult};
use uuid::Uuid;

/// Repository for user data access
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user
    pub async fn create(&self, user: &User) -> SqlxResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, nickname, points, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, nickname, points, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.nickname)
        .bind(user.points)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Find a user by UUID
    pub async fn find_by_id(&self, id: Uuid) -> SqlxResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, nickname, points, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> SqlxResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, nickname, points, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Lock several users; rows are locked in ascending id order
    pub async fn lock_many(conn: &mut PgConnection, ids: &[Uuid]) -> SqlxResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, nickname, points, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
    }

    /// Write the balance
    pub async fn update_points(conn: &mut PgConnection, user: &User) -> SqlxResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET points = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(user.points)
        .bind(user.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}
