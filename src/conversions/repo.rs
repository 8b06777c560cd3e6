use sqlx::SqlitePool;

use crate::conversions::repo_types::Conversion;

impl Conversion {
    pub async fn record(
        db: &SqlitePool,
        user_id: i64,
        tool: &str,
        original_filename: &str,
        converted_filename: &str,
    ) -> anyhow::Result<Conversion> {
        let row = sqlx::query_as::<_, Conversion>(
            r#"
            INSERT INTO conversions (user_id, tool, original_filename, converted_filename)
            VALUES (?, ?, ?, ?)
            RETURNING id, tool, original_filename, converted_filename, created_at
            "#,
        )
        .bind(user_id)
        .bind(tool)
        .bind(original_filename)
        .bind(converted_filename)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Newest first.
    pub async fn recent_for_user(
        db: &SqlitePool,
        user_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Conversion>> {
        let rows = sqlx::query_as::<_, Conversion>(
            r#"
            SELECT id, tool, original_filename, converted_filename, created_at
            FROM conversions
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod repo_tests {
    use super::*;
    use crate::auth::repo_types::User;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn history_is_per_user_and_newest_first() {
        let db = memory_pool().await;
        let ada = User::create(&db, "ada", "", "h").await.unwrap();
        let bob = User::create(&db, "bob", "", "h").await.unwrap();

        Conversion::record(&db, ada.id, "merge", "a.pdf", "merged_1.pdf").await.unwrap();
        Conversion::record(&db, ada.id, "split-pdf", "b.pdf", "split_2.pdf").await.unwrap();
        Conversion::record(&db, bob.id, "merge", "c.pdf", "merged_3.pdf").await.unwrap();

        let rows = Conversion::recent_for_user(&db, ada.id, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tool, "split-pdf");
        assert_eq!(rows[1].original_filename, "a.pdf");

        assert_eq!(Conversion::recent_for_user(&db, ada.id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_requires_existing_user() {
        let db = memory_pool().await;
        assert!(Conversion::record(&db, 42, "merge", "a.pdf", "m.pdf").await.is_err());
    }
}
