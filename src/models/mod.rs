//! Data models for extracted voucher listings

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// E-commerce platforms the aggregator page covers.
///
/// Each variant maps to a row in the `ecommerce` lookup table; the database
/// layer resolves the stable integer id at reconcile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Shopee,
    Lazada,
    Tiki,
    Sendo,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Self::Shopee => "Shopee",
            Self::Lazada => "Lazada",
            Self::Tiki => "Tiki",
            Self::Sendo => "Sendo",
        }
    }

    /// URL substring used to pick out this platform's apply anchor
    /// inside a voucher element.
    pub fn link_fragment(self) -> &'static str {
        match self {
            Self::Shopee => "shopee",
            Self::Lazada => "lazada",
            Self::Tiki => "tiki",
            Self::Sendo => "sendo",
        }
    }
}

/// Discount flavour of a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountKind {
    /// Percentage off, magnitude in percent points.
    Percent,
    /// Fixed amount off, magnitude in currency units ("50K" = 50 000).
    FixedAmount,
}

impl DiscountKind {
    /// Stored as the `is_percent_discount` column.
    pub fn is_percent(self) -> bool {
        matches!(self, Self::Percent)
    }

    pub fn from_is_percent(is_percent: bool) -> Self {
        if is_percent {
            Self::Percent
        } else {
            Self::FixedAmount
        }
    }
}

/// Raw, untyped field set extracted from one voucher element on the page.
///
/// Everything is still free text at this point; the field parser turns a
/// bundle into a [`VoucherRecord`]. Bundles are transient and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVoucherBundle {
    pub supplier: String,
    pub supplier_logo: Option<String>,
    pub discount_text: String,
    pub minimum_order: Option<String>,
    pub availability: Option<String>,
    pub note: Option<String>,
    pub expiry_text: Option<String>,
    pub apply_link: Option<String>,
    pub banner_link: Option<String>,
    pub coupon_code: Option<String>,
}

/// A typed voucher record at the pipeline boundary.
///
/// Produced fresh on every extraction run; the reconciliation gateway either
/// inserts it or merges its mutable fields into an already stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub platform: Platform,
    pub supplier: String,
    pub supplier_logo: Option<String>,
    pub category: Option<String>,
    pub kind: DiscountKind,
    /// Always non-negative; "K" suffixes are already multiplied out.
    pub discount_value: f64,
    pub min_order_value: Option<f64>,
    /// Percent of the voucher pool still available, when the page shows it.
    pub available: Option<f64>,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub expired_date: Option<NaiveDateTime>,
    /// Natural dedup key when present.
    pub apply_link: Option<String>,
    pub banner_link: Option<String>,
    /// Only meaningful for fixed-amount vouchers.
    pub coupon_code: Option<String>,
}
