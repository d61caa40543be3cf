//! SQLite user replica.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::storage::schema::{Users, CREATE_USERS_TABLE};
use crate::storage::{ReplicaRecord, ReplicaStore, Result, StorageError, UserRecord};

/// SQLite implementation of `ReplicaStore<UserRecord>`.
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Create a new SQLite user store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_USERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ReplicaStore<UserRecord> for SqliteUserStore {
    async fn find(&self, id: i64) -> Result<Option<UserRecord>> {
        let query = Query::select()
            .columns([Users::Id, Users::UserName])
            .from(Users::Table)
            .and_where(Expr::col(Users::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            user_name: row.get("user_name"),
        }))
    }

    async fn add(&self, record: UserRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(Users::Table)
            .columns([Users::Id, Users::UserName])
            .values_panic([record.id.into(), record.user_name.into()])
            .on_conflict(
                OnConflict::column(Users::Id)
                    .update_column(Users::UserName)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn update(&self, record: UserRecord) -> Result<()> {
        let id = record.id;
        let query = Query::update()
            .table(Users::Table)
            .value(Users::UserName, record.user_name)
            .and_where(Expr::col(Users::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                kind: UserRecord::KIND,
                id,
            });
        }
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let query = Query::delete()
            .from_table(Users::Table)
            .and_where(Expr::col(Users::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
