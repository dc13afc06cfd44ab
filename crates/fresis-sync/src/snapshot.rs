//! # Snapshot Acquisition
//!
//! The injected seams between the engine and the upstream export, plus the
//! concrete adapters the daemon ships with.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Snapshot Acquisition                                │
//! │                                                                         │
//! │  browser automation (external) ──writes──▶ spool directory              │
//! │                                               │                         │
//! │  SnapshotSource::download(kind, user) ──picks─┘ newest file             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SnapshotParser::parse(path) ──▶ Vec<Record>   (pure CPU)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pipeline reconciles, then SnapshotSource::cleanup(path)                │
//! │  (best-effort, every exit path)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record field names are the camelCase keys of the upstream export; the
//! repositories own the snake_case mapping on the store side.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fresis_core::SyncKind;

use crate::error::{SyncError, SyncResult};

/// Scope label used for shared kinds, which have no tenant.
pub const SERVICE_ACCOUNT: &str = "service-account";

// =============================================================================
// Capability Seams
// =============================================================================

/// Produces a local snapshot file for one `(kind, user)` scope.
///
/// Failures surface as [`SyncError::Network`]; the scheduler retries at
/// the next tick without back-off.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Materializes the newest snapshot and returns its local path.
    async fn download(&self, kind: SyncKind, user_id: Option<&str>) -> SyncResult<PathBuf>;

    /// Removes a consumed snapshot file. Best-effort: swallows its own
    /// errors, the pipelines call it on every exit path.
    async fn cleanup(&self, path: &Path);
}

/// Parses a snapshot file into a finite record sequence. Pure CPU.
pub trait SnapshotParser<R>: Send + Sync {
    fn parse(&self, path: &Path) -> SyncResult<Vec<R>>;
}

// =============================================================================
// Snapshot Records
// =============================================================================

/// One customer as exported by the upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub customer_profile: String,
    pub business_name: String,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub fiscal_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub pec_email: Option<String>,
    #[serde(default)]
    pub sdi_code: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub price_list: Option<String>,
    #[serde(default)]
    pub discount_class: Option<String>,
    #[serde(default)]
    pub sales_agent: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub delivery_city: Option<String>,
    #[serde(default)]
    pub delivery_province: Option<String>,
    #[serde(default)]
    pub delivery_postal_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CustomerRecord {
    /// Required-field check; failures skip the record, never the sync.
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_profile.trim().is_empty() {
            return Err("customer record without customerProfile".into());
        }
        if self.business_name.trim().is_empty() {
            return Err(format!(
                "customer {} without businessName",
                self.customer_profile
            ));
        }
        Ok(())
    }
}

/// One article line inside an order export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderArticleRecord {
    pub article_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: Option<String>,
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub line_total: Option<String>,
}

/// One order as exported by the upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    pub order_number: String,
    #[serde(default)]
    pub customer_profile: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub order_date: Option<i64>,
    #[serde(default)]
    pub delivery_date: Option<i64>,
    pub sales_status: String,
    #[serde(default)]
    pub document_status: Option<String>,
    #[serde(default)]
    pub transfer_status: Option<String>,
    #[serde(default)]
    pub taxable_amount: Option<String>,
    #[serde(default)]
    pub vat_amount: Option<String>,
    pub total_amount: String,
    #[serde(default)]
    pub articles: Vec<OrderArticleRecord>,
}

impl OrderRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("order record without id".into());
        }
        if self.order_number.trim().is_empty() {
            return Err(format!("order {} without orderNumber", self.id));
        }
        if self.total_amount.trim().is_empty() {
            return Err(format!("order {} without totalAmount", self.id));
        }
        Ok(())
    }
}

/// One product as exported by the upstream.
///
/// The export is content-addressed: `hash` arrives precomputed and the
/// engine never recomputes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub vat_rate: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub hash: String,
}

impl ProductRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("product record without id".into());
        }
        if self.hash.trim().is_empty() {
            return Err(format!("product {} without content hash", self.id));
        }
        Ok(())
    }
}

/// One price as exported by the upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub product_id: String,
    #[serde(default)]
    pub item_selection: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub price_valid_from: i64,
    #[serde(default)]
    pub price_valid_to: Option<i64>,
    #[serde(default)]
    pub price_qty_from: Option<f64>,
    #[serde(default)]
    pub price_qty_to: Option<f64>,
}

impl PriceRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.product_id.trim().is_empty() {
            return Err("price record without productId".into());
        }
        if self.price_valid_from <= 0 {
            return Err(format!(
                "price for {} without priceValidFrom",
                self.product_id
            ));
        }
        Ok(())
    }
}

/// One delivery note (DDT) as extracted from the upstream documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdtRecord {
    pub order_number: String,
    pub ddt_number: String,
    #[serde(default)]
    pub ddt_date: Option<i64>,
    #[serde(default)]
    pub ddt_status: Option<String>,
}

impl DdtRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.order_number.trim().is_empty() {
            return Err("ddt record without orderNumber".into());
        }
        if self.ddt_number.trim().is_empty() {
            return Err(format!("ddt for {} without ddtNumber", self.order_number));
        }
        Ok(())
    }
}

/// One invoice as extracted from the upstream documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub order_number: String,
    pub invoice_number: String,
    #[serde(default)]
    pub invoice_date: Option<i64>,
}

impl InvoiceRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.order_number.trim().is_empty() {
            return Err("invoice record without orderNumber".into());
        }
        if self.invoice_number.trim().is_empty() {
            return Err(format!(
                "invoice for {} without invoiceNumber",
                self.order_number
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Spool-Directory Source
// =============================================================================

/// Picks the newest file from the drop directory the browser-automation
/// tool exports into.
///
/// ## Directory Layout
/// ```text
/// <root>/<kind>/<user or "service-account">/<export files>
/// ```
#[derive(Debug, Clone)]
pub struct SpoolDirSource {
    root: PathBuf,
}

impl SpoolDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SpoolDirSource { root: root.into() }
    }

    fn scope_dir(&self, kind: SyncKind, user_id: Option<&str>) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(user_id.unwrap_or(SERVICE_ACCOUNT))
    }
}

#[async_trait]
impl SnapshotSource for SpoolDirSource {
    async fn download(&self, kind: SyncKind, user_id: Option<&str>) -> SyncResult<PathBuf> {
        let dir = self.scope_dir(kind, user_id);

        let entries = std::fs::read_dir(&dir)
            .map_err(|e| SyncError::Network(format!("spool dir {}: {e}", dir.display())))?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry
                .map_err(|e| SyncError::Network(format!("spool dir {}: {e}", dir.display())))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| SyncError::Network(format!("{}: {e}", path.display())))?;

            let is_newer = match &newest {
                None => true,
                Some((current, _)) => modified > *current,
            };
            if is_newer {
                newest = Some((modified, path));
            }
        }

        match newest {
            Some((_, path)) => {
                debug!(kind = %kind, path = %path.display(), "Snapshot picked from spool");
                Ok(path)
            }
            None => Err(SyncError::Network(format!(
                "no snapshot available in {}",
                dir.display()
            ))),
        }
    }

    async fn cleanup(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Snapshot cleanup failed");
        }
    }
}

// =============================================================================
// JSON Parser
// =============================================================================

/// Parses a snapshot file holding one JSON array of records.
pub struct JsonSnapshotParser<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> JsonSnapshotParser<R> {
    pub fn new() -> Self {
        JsonSnapshotParser {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for JsonSnapshotParser<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SnapshotParser<R> for JsonSnapshotParser<R>
where
    R: DeserializeOwned + Send + Sync,
{
    fn parse(&self, path: &Path) -> SyncResult<Vec<R>> {
        let bytes = std::fs::read(path)
            .map_err(|e| SyncError::Parse(format!("{}: {e}", path.display())))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Parse(format!("{}: {e}", path.display())))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn json_parser_reads_camel_case_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"customerProfile":"CP-001","businessName":"Rossi SRL","city":"Milano"}}]"#
        )
        .unwrap();

        let parser = JsonSnapshotParser::<CustomerRecord>::new();
        let records = parser.parse(file.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].customer_profile, "CP-001");
        assert_eq!(records[0].city.as_deref(), Some("Milano"));
    }

    #[test]
    fn json_parser_rejects_malformed_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let parser = JsonSnapshotParser::<CustomerRecord>::new();
        let err = parser.parse(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)));
    }

    #[test]
    fn record_validation_flags_missing_required_fields() {
        let record = CustomerRecord {
            customer_profile: " ".into(),
            business_name: "Rossi SRL".into(),
            ..Default::default()
        };
        assert!(record.validate().is_err());

        let record = PriceRecord {
            product_id: "PROD-050".into(),
            price_valid_from: 0,
            ..Default::default()
        };
        assert!(record.validate().is_err());

        let record = DdtRecord {
            order_number: "SO-030".into(),
            ddt_number: "DDT-7".into(),
            ..Default::default()
        };
        assert!(record.validate().is_ok());
    }

    #[tokio::test]
    async fn spool_source_picks_the_newest_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("customers").join("U1");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(dir.join("old.json"), "[]").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        std::fs::write(dir.join("new.json"), "[]").unwrap();

        let source = SpoolDirSource::new(root.path());
        let picked = source
            .download(SyncKind::Customers, Some("U1"))
            .await
            .unwrap();
        assert!(picked.ends_with("new.json"));
    }

    #[tokio::test]
    async fn spool_source_reports_missing_snapshots_as_network_errors() {
        let root = tempfile::tempdir().unwrap();
        let source = SpoolDirSource::new(root.path());

        let err = source.download(SyncKind::Products, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }

    #[tokio::test]
    async fn cleanup_swallows_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let source = SpoolDirSource::new(root.path());
        source.cleanup(Path::new("/nonexistent/snapshot.json")).await;
    }
}
