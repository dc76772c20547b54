//! Record derivation from raw transaction payloads
//!
//! A raw payload carries every exported column as text. Derivation checks
//! the business preconditions, then fills the segmentation features: the
//! manufacturing region from the location code, the product family from the
//! product group, MAKE/BUY grouping, the STAR customer-region override, the
//! NEW/OLD customer flag and the ordered-quantity bucket.

use chrono::{Datelike, NaiveDate};
use csv::ReaderBuilder;
use lumen_segment_core::{CategoricalValue, Record, Table};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info};

use crate::errors::TrainerError;

pub const MANUFACTURING_REGION: &str = "manufacturing_region";
pub const CUSTOMER_REGION: &str = "customer_region";
pub const CUSTOMER_INDUSTRY: &str = "customer_industry";
pub const PRODUCT_FAMILY: &str = "product_family";
pub const MAKE_VS_BUY: &str = "make_vs_buy";
pub const NEW_OLD_CUSTOMER: &str = "new_old_customer";
pub const ORDERED_QTY_BUCKET: &str = "ordered_qty_bucket";
pub const GM: &str = "gm";

/// Derived categorical columns, in table order
pub const DERIVED_FEATURES: [&str; 7] = [
    MANUFACTURING_REGION,
    CUSTOMER_REGION,
    CUSTOMER_INDUSTRY,
    PRODUCT_FAMILY,
    MAKE_VS_BUY,
    NEW_OLD_CUSTOMER,
    ORDERED_QTY_BUCKET,
];

/// First year counted as a NEW customer
pub const NEW_CUSTOMER_YEAR: i32 = 2015;

const MAKE_LABELS: [&str; 3] = ["MANUFACTURED", "RAW MATERIAL", "FINISHED GOODS"];

const DISALLOWED_MAKE_VS_BUY: [&str; 4] = [
    "RAW MATERIAL",
    "BUY - CUST. SUPPLIED",
    "BUY - INTERPLNT TRNS",
    "PURCHASED (RAW)",
];

static MANUFACTURING_REGIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("N7", "North America"),
        ("N13", "Asia"),
        ("N12", "Asia"),
        ("N1", "North America"),
        ("B6", "North America"),
        ("B1", "North America"),
        ("B70", "Asia"),
        ("B77", "Asia"),
        ("B3", "North America"),
        ("N8", "Europe"),
        ("K1", "Asia"),
        ("N4", "North America"),
        ("N2", "North America"),
        ("L1", "North America"),
        ("B20", "North America"),
        ("B21", "North America"),
        ("B76", "Asia"),
        ("L2", "North America"),
        ("N15", "North America"),
        ("C3", "Asia"),
        ("T1", "Asia"),
        ("N10", "Asia"),
        ("N6", "Europe"),
        ("L4", "North America"),
        ("K2", "Asia"),
        ("C5", "Asia"),
        ("B8", "North America"),
        ("S1", "Europe"),
    ]
    .into_iter()
    .collect()
});

static PRODUCT_FAMILIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let pf001 = [
        "PC001", "PC005", "PC006", "PC008", "PC009", "PC010", "PC011", "PC015", "PC016", "PC018", "PC020", "PC021",
        "PC023", "PC025",
    ];
    let pf002 = [
        "PC002", "PC003", "PC004", "PC007", "PC012", "PC013", "PC014", "PC017", "PC019", "PC022", "PC024", "PC026",
        "PC028", "PC029", "PC030", "SF001", "SF002",
    ];
    pf001
        .into_iter()
        .map(|group| (group, "PF001"))
        .chain(pf002.into_iter().map(|group| (group, "PF002")))
        .collect()
});

/// One exported transaction line, every field as raw text
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPayload {
    pub manufacturing_region: Option<String>,
    pub manufacturing_location_code: Option<String>,
    pub customer_industry: Option<String>,
    pub customer_region: Option<String>,
    pub customer_first_invoice_date: Option<String>,
    pub top_customer_group: Option<String>,
    pub product_family: Option<String>,
    pub product_group: Option<String>,
    pub make_vs_buy: Option<String>,
    pub intercompany: Option<String>,
    pub customer_id: Option<String>,
    pub ordered_qty: Option<String>,
    pub invoiced_qty_shipped: Option<String>,
    pub invoiced_price: Option<String>,
    pub cost_of_part: Option<String>,
    pub gm: Option<String>,
}

/// Text field, `None` for any missing spelling
fn text(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(CategoricalValue::parse)
        .and_then(|value| value.as_str().map(str::to_string))
}

/// Numeric field, `None` when missing
fn number(name: &str, raw: &Option<String>) -> Result<Option<f64>, TrainerError> {
    match text(raw) {
        None => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| TrainerError::Rejected(format!("{name} is not a number: '{value}'"))),
    }
}

/// Label of the ordered-quantity bucket, `None` below one unit
pub fn quantity_bucket(ordered_qty: f64) -> Option<&'static str> {
    if (1.0..=10.0).contains(&ordered_qty) {
        Some("[1, 10]")
    } else if ordered_qty > 10.0 && ordered_qty <= 100.0 {
        Some("(10, 100]")
    } else if ordered_qty > 100.0 && ordered_qty <= 1000.0 {
        Some("(100, 1000]")
    } else if ordered_qty > 1000.0 && ordered_qty <= 10000.0 {
        Some("(1000, 10000]")
    } else if ordered_qty > 10000.0 {
        Some("(10000, inf)")
    } else {
        None
    }
}

/// MAKE for manufactured lines, BUY for everything else
pub fn make_or_buy(make_vs_buy: &str) -> &'static str {
    if MAKE_LABELS.contains(&make_vs_buy) {
        "MAKE"
    } else {
        "BUY"
    }
}

/// NEW when the first invoice is in or after [`NEW_CUSTOMER_YEAR`]
///
/// Accepts a date with an optional time suffix (`2011-05-27 00:00:00`).
pub fn customer_age(first_invoice_date: &str) -> Result<&'static str, TrainerError> {
    let (date, _) = NaiveDate::parse_and_remainder(first_invoice_date.trim(), "%Y-%m-%d").map_err(|err| {
        TrainerError::Rejected(format!(
            "customer_first_invoice_date '{first_invoice_date}' is not a date: {err}"
        ))
    })?;
    Ok(if date.year() >= NEW_CUSTOMER_YEAR { "NEW" } else { "OLD" })
}

/// Business preconditions a line must satisfy to be scored
///
/// Missing numeric fields are not checked.
pub fn check_preconditions(payload: &RawPayload) -> Result<(), TrainerError> {
    let reject = |message: String| -> Result<(), TrainerError> { Err(TrainerError::Rejected(message)) };

    if number("cost_of_part", &payload.cost_of_part)?.is_some_and(|v| v <= 0.0) {
        return reject("cost of part cannot be <= 0".into());
    }
    if number("invoiced_price", &payload.invoiced_price)?.is_some_and(|v| v <= 0.0) {
        return reject("invoiced price cannot be <= 0".into());
    }
    if number("invoiced_qty_shipped", &payload.invoiced_qty_shipped)?.is_some_and(|v| v <= 0.0) {
        return reject("invoiced quantity shipped cannot be <= 0".into());
    }
    if number("ordered_qty", &payload.ordered_qty)?.is_some_and(|v| v <= 0.0) {
        return reject("ordered quantity cannot be <= 0".into());
    }
    if text(&payload.intercompany).as_deref() == Some("YES") {
        return reject("intercompany cannot be 'YES'".into());
    }
    if number("customer_id", &payload.customer_id)?.is_some_and(|v| v < 0.0) {
        return reject("customer id cannot be negative".into());
    }
    if let Some(make_vs_buy) = text(&payload.make_vs_buy) {
        if DISALLOWED_MAKE_VS_BUY.contains(&make_vs_buy.as_str()) {
            return reject(format!("make_vs_buy value '{make_vs_buy}' not allowed"));
        }
    }
    if number(GM, &payload.gm)?.is_some_and(|v| v <= 0.0 || v >= 1.0) {
        return reject("gross margin must lie in (0, 1)".into());
    }
    Ok(())
}

/// Check preconditions and derive the segmentation record
pub fn derive_record(payload: &RawPayload) -> Result<Record, TrainerError> {
    check_preconditions(payload)?;

    let manufacturing_region = text(&payload.manufacturing_region).or_else(|| {
        text(&payload.manufacturing_location_code)
            .and_then(|code| MANUFACTURING_REGIONS.get(code.as_str()).map(|r| r.to_string()))
    });

    let product_family = text(&payload.product_family).or_else(|| {
        text(&payload.product_group).and_then(|group| PRODUCT_FAMILIES.get(group.as_str()).map(|f| f.to_string()))
    });

    let make_vs_buy = text(&payload.make_vs_buy).map(|value| make_or_buy(&value).to_string());

    let customer_region = if text(&payload.top_customer_group).as_deref() == Some("STAR") {
        Some("STAR".to_string())
    } else {
        text(&payload.customer_region)
    };

    let new_old_customer = match text(&payload.customer_first_invoice_date) {
        Some(date) => Some(customer_age(&date)?.to_string()),
        None => None,
    };

    let ordered_qty_bucket = number("ordered_qty", &payload.ordered_qty)?
        .and_then(quantity_bucket)
        .map(str::to_string);

    let mut record = Record::new();
    let fields = [
        (MANUFACTURING_REGION, manufacturing_region),
        (CUSTOMER_REGION, customer_region),
        (CUSTOMER_INDUSTRY, text(&payload.customer_industry)),
        (PRODUCT_FAMILY, product_family),
        (MAKE_VS_BUY, make_vs_buy),
        (NEW_OLD_CUSTOMER, new_old_customer),
        (ORDERED_QTY_BUCKET, ordered_qty_bucket),
    ];
    for (feature, value) in fields {
        record.set(feature, value.map_or(CategoricalValue::Missing, CategoricalValue::Present));
    }
    record.target = number(GM, &payload.gm)?;

    Ok(record)
}

/// Raw lines read by [`derive_table`] and how many were kept
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerivationStats {
    pub read: usize,
    pub rejected: usize,
    pub missing_target: usize,
}

/// Derive a training table from a raw export
///
/// Lines failing a precondition or lacking a margin are skipped and
/// counted; malformed CSV aborts.
pub fn derive_table<R: Read>(reader: R, delimiter: u8) -> anyhow::Result<(Table, DerivationStats)> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = DERIVED_FEATURES.iter().map(|f| f.to_string()).collect();
    let mut table = Table::new(columns.clone(), GM);
    let mut stats = DerivationStats::default();

    for (row_idx, result) in rdr.deserialize::<RawPayload>().enumerate() {
        let payload = result.map_err(|err| anyhow::anyhow!("Row {}: {}", row_idx + 1, err))?;
        stats.read += 1;

        let record = match derive_record(&payload) {
            Ok(record) => record,
            Err(err) => {
                debug!(row = row_idx + 1, error = %err, "skipping raw line");
                stats.rejected += 1;
                continue;
            }
        };
        let Some(target) = record.target else {
            stats.missing_target += 1;
            continue;
        };

        let values = columns.iter().map(|c| record.get(c)).collect();
        table.push_row(values, target)?;
    }

    info!(
        read = stats.read,
        kept = table.len(),
        rejected = stats.rejected,
        missing_target = stats.missing_target,
        "derived training table"
    );

    Ok((table, stats))
}
