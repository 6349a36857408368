use {async_trait::async_trait, sqlx::SqlitePool};

use crate::Result;

/// A known client record the resolver may link chats to.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// Read access to the known-client directory. The directory itself is
/// maintained outside this core (CRM import, provisioning); the resolver
/// only reads it.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<ContactRecord>>;
    async fn upsert(&self, record: ContactRecord) -> Result<()>;
}

/// SQLite-backed contact directory.
pub struct SqliteContactDirectory {
    pool: SqlitePool,
}

impl SqliteContactDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the contacts schema. Safe to call repeatedly.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                id    TEXT PRIMARY KEY,
                name  TEXT NOT NULL,
                phone TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for SqliteContactDirectory {
    async fn list(&self) -> Result<Vec<ContactRecord>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, name, phone FROM contacts",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ContactRecord {
                id: r.0,
                name: r.1,
                phone: r.2,
            })
            .collect())
    }

    async fn upsert(&self, record: ContactRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO contacts (id, name, phone) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, phone = excluded.phone",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_and_list() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteContactDirectory::init(&pool).await.unwrap();
        let dir = SqliteContactDirectory::new(pool);

        dir.upsert(ContactRecord {
            id: "c1".into(),
            name: "Maria".into(),
            phone: "+55 11 99999-0000".into(),
        })
        .await
        .unwrap();
        dir.upsert(ContactRecord {
            id: "c1".into(),
            name: "Maria Silva".into(),
            phone: "+55 11 99999-0000".into(),
        })
        .await
        .unwrap();

        let all = dir.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Maria Silva");
    }
}
