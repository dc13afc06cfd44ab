//! # Customer Repository
//!
//! Database operations for tenant-scoped customers.
//!
//! ## Reconciliation Support
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              What the customer pipeline needs                           │
//! │                                                                         │
//! │  hashes_for_user(U)    → profile → hash map of the whole tenant         │
//! │  insert / update       → full-row writes decided by the hash diff       │
//! │  touch                 → last_sync refresh on an unchanged row          │
//! │  delete_missing        → one DELETE pruning profiles that left the      │
//! │                          snapshot (no cascade: customers are roots)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement carries `user_id`; the tenant isolation invariant is
//! enforced here, not in the callers.

use sqlx::PgPool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::filter::QueryFilter;
use fresis_core::Customer;

const CUSTOMER_COLUMNS: &str = "customer_profile, user_id, business_name, vat_number, \
     fiscal_code, address, city, province, postal_code, country, phone, mobile, email, \
     pec_email, sdi_code, contact_person, payment_terms, payment_method, iban, bank_name, \
     price_list, discount_class, sales_agent, delivery_address, delivery_city, \
     delivery_province, delivery_postal_code, notes, hash, last_sync";

/// Optional read criteria for the sales application.
#[derive(Debug, Default, Clone)]
pub struct CustomerFilter {
    /// Substring match on the business name.
    pub name: Option<String>,
    pub city: Option<String>,
    pub vat_number: Option<String>,
}

/// Repository for the `agents.customers` table.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        CustomerRepository { pool }
    }

    /// Loads `(customer_profile, hash)` for the whole tenant.
    ///
    /// One scan per pipeline run; the reconciliation loop decides
    /// insert/update/skip against this map without further reads.
    pub async fn hashes_for_user(&self, user_id: &str) -> DbResult<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT customer_profile, hash FROM agents.customers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Gets one customer.
    pub async fn get(&self, user_id: &str, customer_profile: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM agents.customers \
             WHERE user_id = $1 AND customer_profile = $2"
        ))
        .bind(user_id)
        .bind(customer_profile)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists customers of a tenant matching the optional criteria.
    pub async fn find(&self, user_id: &str, criteria: &CustomerFilter) -> DbResult<Vec<Customer>> {
        let mut filter = QueryFilter::new();
        filter.eq_text("user_id", user_id);
        if let Some(ref name) = criteria.name {
            filter.contains("business_name", name);
        }
        if let Some(ref city) = criteria.city {
            filter.eq_text("city", city.clone());
        }
        if let Some(ref vat) = criteria.vat_number {
            filter.eq_text("vat_number", vat.clone());
        }

        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM agents.customers {} ORDER BY business_name",
            filter.where_clause()
        );

        let customers = filter
            .bind_all(sqlx::query_as::<_, Customer>(&sql))
            .fetch_all(&self.pool)
            .await?;

        Ok(customers)
    }

    /// Inserts a new customer row.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(
            user_id = %customer.user_id,
            profile = %customer.customer_profile,
            "Inserting customer"
        );

        sqlx::query(&format!(
            "INSERT INTO agents.customers ({CUSTOMER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
              $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)"
        ))
        .bind(&customer.customer_profile)
        .bind(&customer.user_id)
        .bind(&customer.business_name)
        .bind(&customer.vat_number)
        .bind(&customer.fiscal_code)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.province)
        .bind(&customer.postal_code)
        .bind(&customer.country)
        .bind(&customer.phone)
        .bind(&customer.mobile)
        .bind(&customer.email)
        .bind(&customer.pec_email)
        .bind(&customer.sdi_code)
        .bind(&customer.contact_person)
        .bind(&customer.payment_terms)
        .bind(&customer.payment_method)
        .bind(&customer.iban)
        .bind(&customer.bank_name)
        .bind(&customer.price_list)
        .bind(&customer.discount_class)
        .bind(&customer.sales_agent)
        .bind(&customer.delivery_address)
        .bind(&customer.delivery_city)
        .bind(&customer.delivery_province)
        .bind(&customer.delivery_postal_code)
        .bind(&customer.notes)
        .bind(&customer.hash)
        .bind(customer.last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites every descriptive column after a hash mismatch.
    pub async fn update(&self, customer: &Customer) -> DbResult<()> {
        debug!(
            user_id = %customer.user_id,
            profile = %customer.customer_profile,
            "Updating customer"
        );

        let result = sqlx::query(
            r#"
            UPDATE agents.customers SET
                business_name = $3,
                vat_number = $4,
                fiscal_code = $5,
                address = $6,
                city = $7,
                province = $8,
                postal_code = $9,
                country = $10,
                phone = $11,
                mobile = $12,
                email = $13,
                pec_email = $14,
                sdi_code = $15,
                contact_person = $16,
                payment_terms = $17,
                payment_method = $18,
                iban = $19,
                bank_name = $20,
                price_list = $21,
                discount_class = $22,
                sales_agent = $23,
                delivery_address = $24,
                delivery_city = $25,
                delivery_province = $26,
                delivery_postal_code = $27,
                notes = $28,
                hash = $29,
                last_sync = $30
            WHERE customer_profile = $1 AND user_id = $2
            "#,
        )
        .bind(&customer.customer_profile)
        .bind(&customer.user_id)
        .bind(&customer.business_name)
        .bind(&customer.vat_number)
        .bind(&customer.fiscal_code)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.province)
        .bind(&customer.postal_code)
        .bind(&customer.country)
        .bind(&customer.phone)
        .bind(&customer.mobile)
        .bind(&customer.email)
        .bind(&customer.pec_email)
        .bind(&customer.sdi_code)
        .bind(&customer.contact_person)
        .bind(&customer.payment_terms)
        .bind(&customer.payment_method)
        .bind(&customer.iban)
        .bind(&customer.bank_name)
        .bind(&customer.price_list)
        .bind(&customer.discount_class)
        .bind(&customer.sales_agent)
        .bind(&customer.delivery_address)
        .bind(&customer.delivery_city)
        .bind(&customer.delivery_province)
        .bind(&customer.delivery_postal_code)
        .bind(&customer.notes)
        .bind(&customer.hash)
        .bind(customer.last_sync)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", &customer.customer_profile));
        }

        Ok(())
    }

    /// Refreshes `last_sync` on a row whose hash matched the snapshot.
    pub async fn touch(&self, user_id: &str, customer_profile: &str, last_sync: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE agents.customers SET last_sync = $3 \
             WHERE user_id = $1 AND customer_profile = $2",
        )
        .bind(user_id)
        .bind(customer_profile)
        .bind(last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every row of the tenant whose profile is not in `keep`.
    ///
    /// Single statement; customers are roots, nothing cascades. Callers
    /// must not invoke this for an empty snapshot - absence of records is
    /// not a delete signal.
    pub async fn delete_missing(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM agents.customers \
             WHERE user_id = $1 AND NOT (customer_profile = ANY($2))",
        )
        .bind(user_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(user_id = %user_id, deleted, "Pruned customers");
        }

        Ok(deleted)
    }
}
