use sqlx::SqlitePool;

use crate::auth::repo_types::User;

impl User {
    /// Find a user by exact username.
    pub async fn find_by_username(db: &SqlitePool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a new user. A taken username surfaces as the driver's unique
    /// violation so callers can tell it apart from other failures.
    pub async fn create(
        db: &SqlitePool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES (?, ?, ?)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }
}

#[cfg(test)]
mod repo_tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn create_and_find() {
        let db = memory_pool().await;
        let user = User::create(&db, "ada", "ada@example.com", "hash").await.unwrap();
        assert_eq!(user.username, "ada");

        let found = User::find_by_username(&db, "ada").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(User::find_by_username(&db, "ADA").await.unwrap().is_none());
        assert!(User::find_by_id(&db, user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_unique_violation() {
        let db = memory_pool().await;
        User::create(&db, "ada", "", "h1").await.unwrap();
        let err = User::create(&db, "ada", "", "h2").await.unwrap_err();
        match err {
            sqlx::Error::Database(e) => assert!(e.is_unique_violation()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
