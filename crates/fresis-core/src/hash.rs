//! # Change-Detection Hashing
//!
//! Canonical serialization and digests for hash-based change detection.
//!
//! ## The Frozen Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Hash Computation                                    │
//! │                                                                         │
//! │  selected fields, fixed order                                           │
//! │       │  canonical string form (NULL → "")                              │
//! │       ▼                                                                 │
//! │  "CP-001|Rossi SRL|IT1||Milano|…"      joined with '|'                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SHA-256 → lowercase hex                                                │
//! │                                                                         │
//! │  equal content  ⇒  equal hash  ⇒  pipeline refreshes last_sync only     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The digest algorithm and the per-entity field orders are FROZEN: stored
//! hashes are compared byte-for-byte across runs and across nodes, so
//! changing either is a schema-breaking migration that invalidates every
//! persisted hash.
//!
//! Field sets per entity:
//! - **Customer**: profile + every descriptive field.
//! - **Order**: `id, order_number, sales_status, document_status,
//!   transfer_status, total_amount` - a minimal change detector; the other
//!   columns update silently.
//! - **Price**: `product_id, unit_price, price_valid_from, price_valid_to,
//!   price_qty_from, price_qty_to`.
//! - **Product**: hash supplied by the snapshot parser, never computed here.

use sha2::{Digest, Sha256};

use crate::types::{Customer, Order, Price};

/// Separator between canonical field values.
pub const FIELD_SEPARATOR: char = '|';

// =============================================================================
// Hash Input Builder
// =============================================================================

/// Accumulates canonical field values and digests them.
///
/// ## Example
/// ```
/// use fresis_core::hash::HashInput;
///
/// let digest = HashInput::new()
///     .text("ORD-001")
///     .opt_text(None)
///     .int(3)
///     .digest();
/// assert_eq!(digest.len(), 64);
/// ```
#[derive(Debug, Default)]
pub struct HashInput {
    parts: Vec<String>,
}

impl HashInput {
    pub fn new() -> Self {
        HashInput { parts: Vec::new() }
    }

    /// Appends a required text field.
    pub fn text(mut self, value: &str) -> Self {
        self.parts.push(value.to_string());
        self
    }

    /// Appends an optional text field; NULL coerces to the empty string.
    pub fn opt_text(mut self, value: Option<&str>) -> Self {
        self.parts.push(value.unwrap_or_default().to_string());
        self
    }

    /// Appends an integer field.
    pub fn int(mut self, value: i64) -> Self {
        self.parts.push(value.to_string());
        self
    }

    /// Appends an optional integer field; NULL coerces to the empty string.
    pub fn opt_int(mut self, value: Option<i64>) -> Self {
        self.parts.push(value.map(|v| v.to_string()).unwrap_or_default());
        self
    }

    /// Appends an optional numeric field.
    ///
    /// Rust's shortest-roundtrip float formatting is deterministic, which
    /// is the property the stored hashes rely on.
    pub fn opt_num(mut self, value: Option<f64>) -> Self {
        self.parts.push(value.map(|v| v.to_string()).unwrap_or_default());
        self
    }

    /// Joins the accumulated parts and returns the lowercase hex digest.
    pub fn digest(self) -> String {
        let joined = self
            .parts
            .join(&FIELD_SEPARATOR.to_string());
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Entity Hash Rules
// =============================================================================

impl Customer {
    /// Digest over the profile and the full descriptive field set.
    pub fn content_hash(&self) -> String {
        HashInput::new()
            .text(&self.customer_profile)
            .text(&self.business_name)
            .opt_text(self.vat_number.as_deref())
            .opt_text(self.fiscal_code.as_deref())
            .opt_text(self.address.as_deref())
            .opt_text(self.city.as_deref())
            .opt_text(self.province.as_deref())
            .opt_text(self.postal_code.as_deref())
            .opt_text(self.country.as_deref())
            .opt_text(self.phone.as_deref())
            .opt_text(self.mobile.as_deref())
            .opt_text(self.email.as_deref())
            .opt_text(self.pec_email.as_deref())
            .opt_text(self.sdi_code.as_deref())
            .opt_text(self.contact_person.as_deref())
            .opt_text(self.payment_terms.as_deref())
            .opt_text(self.payment_method.as_deref())
            .opt_text(self.iban.as_deref())
            .opt_text(self.bank_name.as_deref())
            .opt_text(self.price_list.as_deref())
            .opt_text(self.discount_class.as_deref())
            .opt_text(self.sales_agent.as_deref())
            .opt_text(self.delivery_address.as_deref())
            .opt_text(self.delivery_city.as_deref())
            .opt_text(self.delivery_province.as_deref())
            .opt_text(self.delivery_postal_code.as_deref())
            .opt_text(self.notes.as_deref())
            .digest()
    }
}

impl Order {
    /// Digest over the minimal change-detector field set.
    pub fn content_hash(&self) -> String {
        self.content_hash_with_number(&self.order_number)
    }

    /// Digest with a substituted order number.
    ///
    /// The order pipeline uses this to decide whether a differing hash is
    /// explained by the order number alone: recompute the incoming hash
    /// with the stored row's number and compare against the stored hash.
    pub fn content_hash_with_number(&self, order_number: &str) -> String {
        HashInput::new()
            .text(&self.id)
            .text(order_number)
            .text(&self.sales_status)
            .opt_text(self.document_status.as_deref())
            .opt_text(self.transfer_status.as_deref())
            .text(&self.total_amount)
            .digest()
    }
}

impl Price {
    /// Digest over the price value and its validity window.
    pub fn content_hash(&self) -> String {
        HashInput::new()
            .text(&self.product_id)
            .opt_num(self.unit_price)
            .int(self.price_valid_from)
            .opt_int(self.price_valid_to)
            .opt_num(self.price_qty_from)
            .opt_num(self.price_qty_to)
            .digest()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_customer() -> Customer {
        Customer {
            customer_profile: "CP-001".into(),
            user_id: "U1".into(),
            business_name: "Rossi SRL".into(),
            vat_number: Some("IT00112233445".into()),
            city: Some("Milano".into()),
            ..Default::default()
        }
    }

    fn sample_order() -> Order {
        Order {
            id: "ORD-030".into(),
            user_id: "U1".into(),
            order_number: "SO-030".into(),
            sales_status: "Open".into(),
            document_status: Some("Draft".into()),
            total_amount: "1000.00".into(),
            ..Default::default()
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let a = HashInput::new().text("a").opt_text(None).int(7).digest();
        let b = HashInput::new().text("a").opt_text(None).int(7).digest();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn null_and_empty_collapse_to_the_same_form() {
        // NULL coerces to "" by rule; the digest cannot tell them apart.
        let a = HashInput::new().text("x").opt_text(None).digest();
        let b = HashInput::new().text("x").opt_text(Some("")).digest();
        assert_eq!(a, b);
    }

    #[test]
    fn field_order_matters() {
        let a = HashInput::new().text("a").text("b").digest();
        let b = HashInput::new().text("b").text("a").digest();
        assert_ne!(a, b);
    }

    #[test]
    fn customer_hash_tracks_descriptive_changes() {
        let base = sample_customer();
        let mut moved = base.clone();
        moved.city = Some("Bologna".into());

        assert_eq!(base.content_hash(), sample_customer().content_hash());
        assert_ne!(base.content_hash(), moved.content_hash());
    }

    #[test]
    fn order_hash_ignores_non_detector_fields() {
        let base = sample_order();
        let mut enriched = base.clone();
        enriched.customer_name = Some("Rossi SRL".into());
        enriched.ddt_number = Some("DDT-99".into());
        enriched.delivery_date = Some(1_770_000_000);

        assert_eq!(base.content_hash(), enriched.content_hash());
    }

    #[test]
    fn order_hash_tracks_detector_fields() {
        let base = sample_order();

        let mut confirmed = base.clone();
        confirmed.sales_status = "Confirmed".into();
        assert_ne!(base.content_hash(), confirmed.content_hash());

        let mut repriced = base.clone();
        repriced.total_amount = "1200.00".into();
        assert_ne!(base.content_hash(), repriced.content_hash());
    }

    #[test]
    fn order_number_substitution_explains_a_rename() {
        let stored = sample_order();
        let mut incoming = stored.clone();
        incoming.order_number = "SO-030-R1".into();

        assert_ne!(stored.content_hash(), incoming.content_hash());
        // Substituting the stored number reproduces the stored hash, so the
        // rename is the only semantic change.
        assert_eq!(
            incoming.content_hash_with_number(&stored.order_number),
            stored.content_hash()
        );
    }

    #[test]
    fn price_hash_covers_value_and_validity() {
        let base = Price {
            product_id: "PROD-050".into(),
            unit_price: Some(9.9),
            price_valid_from: 1_767_225_600,
            ..Default::default()
        };

        let mut repriced = base.clone();
        repriced.unit_price = Some(10.4);
        assert_ne!(base.content_hash(), repriced.content_hash());

        let mut shifted = base.clone();
        shifted.price_valid_from = 1_775_001_600;
        assert_ne!(base.content_hash(), shifted.content_hash());

        let mut blanked = base.clone();
        blanked.unit_price = None;
        assert_ne!(base.content_hash(), blanked.content_hash());
    }
}
