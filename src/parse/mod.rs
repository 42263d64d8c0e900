//! Pure field parsing: raw scraped text into typed voucher fields.
//!
//! Everything here is total: unparseable input degrades to a documented
//! default instead of an error, because a half-readable voucher listing is
//! still worth storing.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DiscountKind, Platform, RawVoucherBundle, VoucherRecord};

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"));

/// Parse a raw discount text like "20%", "50K" or "100.000đ".
///
/// "%" wins over "K" when both appear. Text with no digits at all parses as
/// a zero fixed-amount discount rather than failing.
pub fn parse_discount(raw: &str) -> (DiscountKind, f64) {
    let leading = LEADING_NUMBER
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    if raw.contains('%') {
        (DiscountKind::Percent, leading.unwrap_or(0.0))
    } else if raw.contains('K') || raw.contains('k') {
        (DiscountKind::FixedAmount, leading.unwrap_or(0.0) * 1000.0)
    } else {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        (DiscountKind::FixedAmount, digits.parse().unwrap_or(0.0))
    }
}

/// Strip everything but digits and parse. Empty after stripping is `None`,
/// never an error.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

const FULL_DATE_TIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const FULL_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y"];

// Shapes the page does not normally use but a general parser would accept.
const BEST_EFFORT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d", "%Y/%m/%d"];

/// Full-date path: ordered exact formats first, then a best-effort sweep.
/// Returns `None` when nothing matches, which callers treat as "no expiry".
pub fn parse_full_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in FULL_DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    for format in FULL_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    for format in BEST_EFFORT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    None
}

/// Short-date path: "dd/MM" with no year, as displayed next to a voucher.
///
/// The current year is assumed; a date that has already passed rolls over to
/// next year, since a visibly displayed short expiry is always in the future.
/// Unparseable input falls back to one month from now, deliberately not the
/// `None` the full-date path produces.
pub fn parse_short_date(raw: &str, now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    let fallback = today.checked_add_months(Months::new(1)).unwrap_or(today);

    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, ['/', '-']);
    let (Some(day), Some(month)) = (
        parts.next().and_then(|p| p.trim().parse::<u32>().ok()),
        parts.next().and_then(|p| p.trim().parse::<u32>().ok()),
    ) else {
        return fallback;
    };

    let Some(candidate) = NaiveDate::from_ymd_opt(today.year(), month, day) else {
        return fallback;
    };

    if candidate < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day).unwrap_or(fallback)
    } else {
        candidate
    }
}

/// Dispatch raw expiry text to the matching date path.
///
/// Texts with two or more date separators carry a year and go down the
/// full-date path (absent on failure); everything else is treated as a short
/// displayed date (one-month default on failure). Empty text means the page
/// showed no expiry at all.
pub fn parse_expiry(raw: &str, now: DateTime<Utc>) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let separators = trimmed.chars().filter(|c| *c == '/' || *c == '-').count();
    if separators >= 2 {
        parse_full_date(trimmed)
    } else {
        Some(parse_short_date(trimmed, now).and_time(NaiveTime::MIN))
    }
}

/// Unwrap aggregator redirect links that carry the true destination in an
/// `origin_link` query parameter. Plain links pass through unchanged; a
/// failed percent-decode yields `None`.
pub fn extract_origin_link(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some((_, query)) = trimmed.split_once('?') else {
        return Some(trimmed.to_string());
    };

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=')
            && key == "origin_link"
        {
            return urlencoding::decode(value).ok().map(|v| v.into_owned());
        }
    }

    Some(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Turn one raw bundle into a typed record. `now` doubles as the record's
/// observation timestamp and the reference point for short-date parsing.
pub fn parse_bundle(
    bundle: &RawVoucherBundle,
    platform: Platform,
    now: DateTime<Utc>,
) -> VoucherRecord {
    let (kind, discount_value) = parse_discount(&bundle.discount_text);

    let category = if bundle.supplier.contains("Toàn Sàn") {
        Some("Toàn Sàn".to_string())
    } else {
        Some("Danh Mục Cụ Thể".to_string())
    };

    let coupon_code = match kind {
        DiscountKind::FixedAmount => non_empty(bundle.coupon_code.clone()),
        DiscountKind::Percent => None,
    };

    let apply_link = bundle
        .apply_link
        .as_deref()
        .and_then(extract_origin_link);

    VoucherRecord {
        platform,
        supplier: bundle.supplier.clone(),
        supplier_logo: non_empty(bundle.supplier_logo.clone()),
        category,
        kind,
        discount_value,
        min_order_value: bundle.minimum_order.as_deref().and_then(parse_numeric),
        available: bundle.availability.as_deref().and_then(parse_numeric),
        description: non_empty(bundle.note.clone()),
        start_date: now,
        expired_date: bundle
            .expiry_text
            .as_deref()
            .and_then(|t| parse_expiry(t, now)),
        banner_link: non_empty(bundle.banner_link.clone()).or_else(|| apply_link.clone()),
        apply_link,
        coupon_code,
    }
}
