use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use std::env;
use tracing::info;

use crate::models::{DiscountKind, Platform, VoucherRecord};

/// Persisted voucher row, as much of it as reconciliation and reporting need.
#[derive(Debug, Clone)]
pub struct StoredVoucher {
    pub id: i64,
    pub supplier: String,
    pub kind: DiscountKind,
    pub discount_value: f64,
    pub start_date: DateTime<Utc>,
    pub expired_date: Option<NaiveDateTime>,
    pub apply_link: Option<String>,
    pub coupon_code: Option<String>,
    pub description: Option<String>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let db_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:database/vouchers.db".to_string());
        Self::connect(&db_url).await
    }

    pub async fn connect(db_url: &str) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");

        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        // An in-memory database exists per connection, so the pool must not
        // open a second one.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(db_url)
                .await?
        } else {
            SqlitePool::connect(db_url).await?
        };

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Resolve a platform to its stable id in the `ecommerce` lookup table.
    pub async fn platform_id(&self, platform: Platform) -> Result<i64> {
        let row = sqlx::query("SELECT id FROM ecommerce WHERE name = ?")
            .bind(platform.name())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.get::<i64, _>("id"))
            .ok_or_else(|| anyhow!("platform {} is not seeded in the lookup table", platform.name()))
    }

    pub async fn find_by_apply_link(&self, apply_link: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM coupon WHERE apply_link = ? LIMIT 1")
            .bind(apply_link)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    pub async fn find_by_composite(
        &self,
        supplier: &str,
        discount_value: f64,
        expired_date: Option<NaiveDateTime>,
        platform_id: i64,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r"
            SELECT id FROM coupon
            WHERE supplier = ? AND discount_value = ? AND expired_date IS ? AND platform = ?
            LIMIT 1
            ",
        )
        .bind(supplier)
        .bind(discount_value)
        .bind(expired_date)
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }

    pub async fn insert_voucher(&self, record: &VoucherRecord, platform_id: i64) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO coupon (
                platform, supplier, supplier_logo, category, is_percent_discount,
                discount_value, min_order_value, available, description,
                start_date, expired_date, apply_link, banner_link, coupon_code
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(platform_id)
        .bind(&record.supplier)
        .bind(&record.supplier_logo)
        .bind(&record.category)
        .bind(record.kind.is_percent())
        .bind(record.discount_value)
        .bind(record.min_order_value)
        .bind(record.available)
        .bind(&record.description)
        .bind(record.start_date)
        .bind(record.expired_date)
        .bind(&record.apply_link)
        .bind(&record.banner_link)
        .bind(&record.coupon_code)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite the mutable fields of an existing row. The id and the
    /// original observation date stay untouched, and a record without an
    /// expiry leaves the stored one in place.
    pub async fn update_voucher(&self, id: i64, record: &VoucherRecord) -> Result<()> {
        sqlx::query(
            r"
            UPDATE coupon SET
                supplier = ?, supplier_logo = ?, category = ?, is_percent_discount = ?,
                discount_value = ?, min_order_value = ?, available = ?, description = ?,
                expired_date = COALESCE(?, expired_date), apply_link = ?, banner_link = ?,
                coupon_code = ?
            WHERE id = ?
            ",
        )
        .bind(&record.supplier)
        .bind(&record.supplier_logo)
        .bind(&record.category)
        .bind(record.kind.is_percent())
        .bind(record.discount_value)
        .bind(record.min_order_value)
        .bind(record.available)
        .bind(&record.description)
        .bind(record.expired_date)
        .bind(&record.apply_link)
        .bind(&record.banner_link)
        .bind(&record.coupon_code)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_voucher(&self, id: i64) -> Result<StoredVoucher> {
        let row = sqlx::query(
            r"
            SELECT id, supplier, is_percent_discount, discount_value, start_date,
                   expired_date, apply_link, coupon_code, description
            FROM coupon WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredVoucher {
            id: row.get("id"),
            supplier: row.get("supplier"),
            kind: DiscountKind::from_is_percent(row.get("is_percent_discount")),
            discount_value: row.get("discount_value"),
            start_date: row.get("start_date"),
            expired_date: row.get("expired_date"),
            apply_link: row.get("apply_link"),
            coupon_code: row.get("coupon_code"),
            description: row.get("description"),
        })
    }

    pub async fn voucher_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM coupon")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Test hook: drop a platform from the lookup table so its records fail
    /// to reconcile.
    #[cfg(test)]
    pub async fn unseed_platform(&self, platform: Platform) -> Result<()> {
        sqlx::query("DELETE FROM ecommerce WHERE name = ?")
            .bind(platform.name())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}
