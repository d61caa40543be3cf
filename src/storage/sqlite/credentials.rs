//! SQLite credential replica.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::storage::schema::{Credentials, CREATE_CREDENTIALS_TABLE};
use crate::storage::{CredentialRecord, ReplicaRecord, ReplicaStore, Result, StorageError};

/// SQLite implementation of `ReplicaStore<CredentialRecord>`.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Create a new SQLite credential store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_CREDENTIALS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplicaStore<CredentialRecord> for SqliteCredentialStore {
    async fn find(&self, id: i64) -> Result<Option<CredentialRecord>> {
        let query = Query::select()
            .columns([Credentials::Id, Credentials::Email, Credentials::Password])
            .from(Credentials::Table)
            .and_where(Expr::col(Credentials::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row.map(|row| CredentialRecord {
            id: row.get("id"),
            email: row.get("email"),
            password: row.get("password"),
        }))
    }

    async fn add(&self, record: CredentialRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(Credentials::Table)
            .columns([Credentials::Id, Credentials::Email, Credentials::Password])
            .values_panic([
                record.id.into(),
                record.email.into(),
                record.password.into(),
            ])
            .on_conflict(
                OnConflict::column(Credentials::Id)
                    .update_columns([Credentials::Email, Credentials::Password])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, record: CredentialRecord) -> Result<()> {
        let id = record.id;
        let query = Query::update()
            .table(Credentials::Table)
            .values([
                (Credentials::Email, record.email.into()),
                (Credentials::Password, record.password.into()),
            ])
            .and_where(Expr::col(Credentials::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                kind: CredentialRecord::KIND,
                id,
            });
        }
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let query = Query::delete()
            .from_table(Credentials::Table)
            .and_where(Expr::col(Credentials::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
