// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL implementation of the catalog store.
//
// Tables:
// - crops      one row per crop, carries `quantity` and the `version` token
// - interests  the per-crop ledger, ordered by `seq`, one row per user per crop
// - users      registered marketplace users
//
// Conditional writes run in one transaction that first bumps the crop's
// version with `WHERE version = $expected`. That UPDATE takes the row lock, so
// a second writer on the same crop blocks until the first commits and then
// matches zero rows. Zero rows is reported as a conflict, never as success.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    CropPatch, CropRecord, InterestEntry, InterestStatus, NewCrop, NewUser, Owner, User,
};
use crate::store::{CatalogStore, StatusUpdate, WriteOutcome};

// -----------------------------------------------------------------------------
// ROW TYPES
// -----------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct CropRow {
    id: Uuid,
    name: String,
    image: String,
    location: String,
    price_per_unit: f64,
    quantity: i64,
    owner_name: String,
    owner_email: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CropRow {
    fn into_record(self, interests: Vec<InterestEntry>) -> CropRecord {
        CropRecord {
            id: self.id,
            name: self.name,
            image: self.image,
            location: self.location,
            price_per_unit: self.price_per_unit,
            quantity: self.quantity,
            owner: Owner {
                owner_name: self.owner_name,
                owner_email: self.owner_email,
            },
            interests,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InterestRow {
    id: Uuid,
    crop_id: Uuid,
    user_email: String,
    quantity: i64,
    message: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<InterestRow> for InterestEntry {
    type Error = AppError;

    fn try_from(row: InterestRow) -> AppResult<Self> {
        let status = InterestStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(format!(
                "interest {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;
        Ok(InterestEntry {
            id: row.id,
            user_email: row.user_email,
            quantity: row.quantity,
            message: row.message,
            status,
            created_at: row.created_at,
        })
    }
}

const CROP_COLUMNS: &str = "id, name, image, location, price_per_unit, quantity, \
     owner_name, owner_email, version, created_at, updated_at";

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create the catalog tables if they don't exist. Safe to run repeatedly.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crops (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                image TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                price_per_unit DOUBLE PRECISION NOT NULL,
                quantity BIGINT NOT NULL,
                owner_name TEXT NOT NULL,
                owner_email TEXT NOT NULL,

                -- Optimistic concurrency token, bumped by every write
                version BIGINT NOT NULL DEFAULT 1,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT crop_quantity_non_negative CHECK (quantity >= 0),
                CONSTRAINT crop_price_non_negative CHECK (price_per_unit >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create crops table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interests (
                id UUID PRIMARY KEY,
                crop_id UUID NOT NULL REFERENCES crops(id) ON DELETE CASCADE,

                -- Submission order within the ledger
                seq BIGSERIAL NOT NULL,

                user_email TEXT NOT NULL,
                quantity BIGINT NOT NULL,
                message TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT interest_quantity_positive CHECK (quantity > 0),
                CONSTRAINT interest_status_known
                    CHECK (status IN ('pending', 'accepted', 'rejected')),
                CONSTRAINT interest_one_per_user UNIQUE (crop_id, user_email)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create interests table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                photo_url TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        for (statement, what) in [
            (
                "CREATE INDEX IF NOT EXISTS idx_interests_crop_seq ON interests(crop_id, seq)",
                "interest ledger index",
            ),
            (
                "CREATE INDEX IF NOT EXISTS idx_interests_user_email ON interests(user_email)",
                "interest user index",
            ),
            (
                "CREATE INDEX IF NOT EXISTS idx_crops_owner_email ON crops(owner_email)",
                "crop owner index",
            ),
            (
                "CREATE INDEX IF NOT EXISTS idx_crops_created_at ON crops(created_at)",
                "crop creation index",
            ),
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {}", what))?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // LOADING HELPERS
    // -------------------------------------------------------------------------

    /// Ledger rows for the given crops, grouped by crop in `seq` order.
    async fn load_ledgers<'e, E>(
        executor: E,
        crop_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<InterestEntry>>>
    where
        E: PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, InterestRow>(
            r#"
            SELECT id, crop_id, user_email, quantity, message, status, created_at
            FROM interests
            WHERE crop_id = ANY($1)
            ORDER BY crop_id, seq ASC
            "#,
        )
        .bind(crop_ids)
        .fetch_all(executor)
        .await?;

        let mut ledgers: HashMap<Uuid, Vec<InterestEntry>> = HashMap::new();
        for row in rows {
            let crop_id = row.crop_id;
            ledgers.entry(crop_id).or_default().push(row.try_into()?);
        }
        Ok(ledgers)
    }

    /// Attach ledgers to crop rows, keeping the row order. Crop rows and
    /// ledgers are read in one repeatable-read snapshot.
    async fn with_ledgers(
        mut tx: Transaction<'_, Postgres>,
        rows: Vec<CropRow>,
    ) -> AppResult<Vec<CropRecord>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut ledgers = Self::load_ledgers(&mut *tx, &ids).await?;
        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let ledger = ledgers.remove(&row.id).unwrap_or_default();
                row.into_record(ledger)
            })
            .collect())
    }

    async fn snapshot(&self) -> AppResult<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Distinguish "crop is gone" from "crop moved on" after a guarded
    /// UPDATE matched no rows.
    async fn crop_exists(tx: &mut Transaction<'_, Postgres>, crop_id: Uuid) -> AppResult<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM crops WHERE id = $1")
            .bind(crop_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(found.is_some())
    }

    /// Bump the crop version if it still equals `expected_version`, optionally
    /// writing a new quantity in the same statement.
    ///
    /// LEARNING NOTE:
    /// `rows_affected() == 0` means either the crop is gone or someone else
    /// bumped the version first; `crop_exists` tells the two apart. If the
    /// caller returns early with `?`, the transaction is dropped without
    /// commit and sqlx rolls it back.
    async fn claim_version(
        tx: &mut Transaction<'_, Postgres>,
        crop_id: Uuid,
        expected_version: i64,
        new_quantity: Option<i64>,
    ) -> AppResult<WriteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE crops
            SET version = version + 1,
                quantity = COALESCE($3, quantity),
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(crop_id)
        .bind(expected_version)
        .bind(new_quantity)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }
        if Self::crop_exists(tx, crop_id).await? {
            Ok(WriteOutcome::Conflict)
        } else {
            Ok(WriteOutcome::NotFound)
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

// =============================================================================
// CATALOG STORE IMPLEMENTATION
// =============================================================================
#[async_trait]
impl CatalogStore for Database {
    async fn find_crop_by_id(&self, id: Uuid) -> AppResult<Option<CropRecord>> {
        let start = Instant::now();
        let mut tx = self.snapshot().await?;

        let row = sqlx::query_as::<_, CropRow>(&format!(
            "SELECT {} FROM crops WHERE id = $1",
            CROP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let crop = Self::with_ledgers(tx, vec![row]).await?.pop();
        metrics::record_db_query("select", start.elapsed().as_secs_f64());
        Ok(crop)
    }

    async fn append_interest(
        &self,
        crop_id: Uuid,
        entry: &InterestEntry,
        expected_version: i64,
    ) -> AppResult<WriteOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let claimed = Self::claim_version(&mut tx, crop_id, expected_version, None).await?;
        if claimed != WriteOutcome::Applied {
            tx.rollback().await?;
            return Ok(claimed);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO interests (id, crop_id, user_email, quantity, message, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(crop_id)
        .bind(&entry.user_email)
        .bind(entry.quantity)
        .bind(&entry.message)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // Same user slipped in under an older version: caller re-reads
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Ok(WriteOutcome::Conflict);
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit().await?;
        metrics::record_db_query("insert", start.elapsed().as_secs_f64());
        Ok(WriteOutcome::Applied)
    }

    async fn update_interest_status_and_quantity(
        &self,
        update: &StatusUpdate,
    ) -> AppResult<WriteOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let claimed = Self::claim_version(
            &mut tx,
            update.crop_id,
            update.expected_version,
            Some(update.new_quantity),
        )
        .await?;
        if claimed != WriteOutcome::Applied {
            tx.rollback().await?;
            return Ok(claimed);
        }

        let flipped = sqlx::query(
            r#"
            UPDATE interests
            SET status = $4
            WHERE id = $1 AND crop_id = $2 AND status = $3
            "#,
        )
        .bind(update.interest_id)
        .bind(update.crop_id)
        .bind(update.expected_status.as_str())
        .bind(update.new_status.as_str())
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() != 1 {
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM interests WHERE id = $1 AND crop_id = $2")
                    .bind(update.interest_id)
                    .bind(update.crop_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(if exists.is_some() {
                WriteOutcome::Conflict
            } else {
                WriteOutcome::NotFound
            });
        }

        tx.commit().await?;
        metrics::record_db_query("update", start.elapsed().as_secs_f64());
        Ok(WriteOutcome::Applied)
    }

    async fn list_crops_with_interests(&self) -> AppResult<Vec<CropRecord>> {
        self.list_crops(None).await
    }

    async fn list_crops(&self, search: Option<&str>) -> AppResult<Vec<CropRecord>> {
        let start = Instant::now();
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let mut tx = self.snapshot().await?;

        let rows = sqlx::query_as::<_, CropRow>(&format!(
            r#"
            SELECT {}
            FROM crops
            WHERE $1::TEXT IS NULL OR strpos(lower(name), lower($1)) > 0
            ORDER BY created_at ASC, id ASC
            "#,
            CROP_COLUMNS
        ))
        .bind(search)
        .fetch_all(&mut *tx)
        .await?;

        let crops = Self::with_ledgers(tx, rows).await?;
        metrics::record_db_query("select", start.elapsed().as_secs_f64());
        Ok(crops)
    }

    async fn latest_crops(&self, limit: usize) -> AppResult<Vec<CropRecord>> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, CropRow>(&format!(
            "SELECT {} FROM crops ORDER BY created_at DESC, id DESC LIMIT $1",
            CROP_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        Self::with_ledgers(tx, rows).await
    }

    async fn crops_by_owner(&self, owner_email: &str) -> AppResult<Vec<CropRecord>> {
        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, CropRow>(&format!(
            "SELECT {} FROM crops WHERE owner_email = $1 ORDER BY created_at ASC, id ASC",
            CROP_COLUMNS
        ))
        .bind(owner_email)
        .fetch_all(&mut *tx)
        .await?;

        Self::with_ledgers(tx, rows).await
    }

    async fn insert_crop(&self, crop: NewCrop) -> AppResult<CropRecord> {
        let record = CropRecord::from_new(crop);

        sqlx::query(
            r#"
            INSERT INTO crops (id, name, image, location, price_per_unit, quantity,
                               owner_name, owner_email, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.image)
        .bind(&record.location)
        .bind(record.price_per_unit)
        .bind(record.quantity)
        .bind(&record.owner.owner_name)
        .bind(&record.owner.owner_email)
        .bind(record.version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_crop(&self, id: Uuid, patch: &CropPatch) -> AppResult<Option<CropRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE crops
            SET name = COALESCE($2, name),
                image = COALESCE($3, image),
                location = COALESCE($4, location),
                price_per_unit = COALESCE($5, price_per_unit),
                quantity = COALESCE($6, quantity),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.image)
        .bind(&patch.location)
        .bind(patch.price_per_unit)
        .bind(patch.quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_crop_by_id(id).await
    }

    async fn delete_crop(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM crops WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_user(&self, user: NewUser) -> AppResult<(User, bool)> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, photo_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, name, email, photo_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.photo_url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = created {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, User>(
            "SELECT id, name, email, photo_url, created_at FROM users WHERE email = $1",
        )
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, email, photo_url, created_at FROM users ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
