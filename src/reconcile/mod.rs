//! Reconciliation gateway: merges freshly parsed voucher records into the
//! store without creating duplicates, and reports what it did.

use anyhow::Result;
use tracing::{error, info};

use crate::database::Database;
use crate::models::VoucherRecord;

/// How incoming records are matched against stored ones.
///
/// An explicit choice rather than hidden conditional logic, so each variant
/// can be exercised independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Match by apply-link equality, only when the incoming link is
    /// non-empty. Safe updates on records whose page identity is stable.
    IdentityLink,
    /// Match by (supplier, discount value, expiry date, platform). Tolerates
    /// volatile anchor URLs; two genuinely distinct vouchers coinciding on
    /// all four fields would merge, which is accepted over duplicates.
    CompositeValue,
}

/// Counts from one reconciliation batch, for operator-facing logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records handed to the gateway.
    pub found: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records dropped by per-record persistence failures.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ReconcileGateway {
    database: Database,
    strategy: MatchStrategy,
}

impl ReconcileGateway {
    pub fn new(database: Database, strategy: MatchStrategy) -> Self {
        Self { database, strategy }
    }

    /// Upsert a batch. Each record is its own unit of work: a failure is
    /// logged and skipped without touching its siblings, and nothing is ever
    /// deleted.
    pub async fn reconcile(&self, records: &[VoucherRecord]) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            found: records.len(),
            ..Default::default()
        };

        for record in records {
            match self.reconcile_one(record).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.inserted += 1,
                Err(e) => {
                    error!(
                        supplier = %record.supplier,
                        apply_link = record.apply_link.as_deref().unwrap_or("-"),
                        "skipping record: {e:#}"
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(
            "reconciled {} records: {} new, {} updated, {} skipped",
            report.found, report.inserted, report.updated, report.skipped
        );
        Ok(report)
    }

    /// Returns `true` when an existing record was updated, `false` on insert.
    async fn reconcile_one(&self, record: &VoucherRecord) -> Result<bool> {
        let platform_id = self.database.platform_id(record.platform).await?;

        let existing = match self.strategy {
            MatchStrategy::IdentityLink => {
                match record.apply_link.as_deref().filter(|link| !link.is_empty()) {
                    Some(link) => self.database.find_by_apply_link(link).await?,
                    None => None,
                }
            }
            MatchStrategy::CompositeValue => {
                self.database
                    .find_by_composite(
                        &record.supplier,
                        record.discount_value,
                        record.expired_date,
                        platform_id,
                    )
                    .await?
            }
        };

        match existing {
            Some(id) => {
                self.database.update_voucher(id, record).await?;
                Ok(true)
            }
            None => {
                self.database.insert_voucher(record, platform_id).await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscountKind, Platform};
    use chrono::{NaiveDate, Utc};

    async fn memory_database() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn record(supplier: &str, apply_link: Option<&str>) -> VoucherRecord {
        VoucherRecord {
            platform: Platform::Shopee,
            supplier: supplier.to_string(),
            supplier_logo: None,
            category: None,
            kind: DiscountKind::Percent,
            discount_value: 20.0,
            min_order_value: None,
            available: None,
            description: Some("đơn từ 0đ".to_string()),
            start_date: Utc::now(),
            expired_date: NaiveDate::from_ymd_opt(2024, 12, 31)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            apply_link: apply_link.map(String::from),
            banner_link: None,
            coupon_code: None,
        }
    }

    #[tokio::test]
    async fn identity_link_upserts_without_duplicating() {
        let db = memory_database().await;
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::IdentityLink);
        let batch = vec![record("Toàn Sàn", Some("https://shopee.vn/a"))];

        let first = gateway.reconcile(&batch).await.unwrap();
        assert_eq!((first.inserted, first.updated), (1, 0));

        let second = gateway.reconcile(&batch).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(db.voucher_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn identity_link_without_a_link_always_inserts() {
        let db = memory_database().await;
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::IdentityLink);
        let batch = vec![record("Toàn Sàn", None)];

        gateway.reconcile(&batch).await.unwrap();
        let report = gateway.reconcile(&batch).await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(db.voucher_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dateless_rescrape_does_not_wipe_the_stored_expiry() {
        let db = memory_database().await;
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::IdentityLink);

        let dated = record("Toàn Sàn", Some("https://shopee.vn/a"));
        gateway.reconcile(std::slice::from_ref(&dated)).await.unwrap();

        // The page sometimes renders the voucher without its expiry span.
        let mut dateless = dated.clone();
        dateless.expired_date = None;
        let report = gateway.reconcile(&[dateless]).await.unwrap();
        assert_eq!(report.updated, 1);

        let id = db.find_by_apply_link("https://shopee.vn/a").await.unwrap().unwrap();
        let stored = db.get_voucher(id).await.unwrap();
        assert_eq!(stored.expired_date, dated.expired_date);
    }

    #[tokio::test]
    async fn composite_strategy_matches_on_value_key() {
        let db = memory_database().await;
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::CompositeValue);

        // Same supplier/discount/expiry/platform but a different link still
        // merges under the composite key.
        let first = record("Thời Trang", Some("https://shopee.vn/a"));
        let mut second = record("Thời Trang", Some("https://shopee.vn/b"));
        second.description = Some("cập nhật".to_string());

        gateway.reconcile(&[first]).await.unwrap();
        let report = gateway.reconcile(std::slice::from_ref(&second)).await.unwrap();

        assert_eq!((report.inserted, report.updated), (0, 1));
        assert_eq!(db.voucher_count().await.unwrap(), 1);

        let id = db.find_by_apply_link("https://shopee.vn/b").await.unwrap().unwrap();
        let stored = db.get_voucher(id).await.unwrap();
        assert_eq!(stored.description.as_deref(), Some("cập nhật"));
    }

    #[tokio::test]
    async fn composite_strategy_keeps_distinct_vouchers_apart() {
        let db = memory_database().await;
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::CompositeValue);

        let first = record("Thời Trang", None);
        let mut second = record("Thời Trang", None);
        second.discount_value = 30.0;

        gateway.reconcile(&[first, second]).await.unwrap();
        assert_eq!(db.voucher_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn per_record_failure_skips_without_aborting_the_batch() {
        let db = memory_database().await;
        db.unseed_platform(Platform::Sendo).await.unwrap();
        let gateway = ReconcileGateway::new(db.clone(), MatchStrategy::IdentityLink);

        let good = record("Toàn Sàn", Some("https://shopee.vn/a"));
        let mut bad = record("Sendo Sale", Some("https://sendo.vn/b"));
        bad.platform = Platform::Sendo;

        let report = gateway.reconcile(&[bad, good]).await.unwrap();

        assert_eq!(report.found, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(db.voucher_count().await.unwrap(), 1);
    }
}
