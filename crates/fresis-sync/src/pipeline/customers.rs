//! # Customer Pipeline
//!
//! Tenant-scoped reconciliation of the customer registry.
//!
//! The content hash covers every descriptive field, so any upstream change
//! rewrites the whole row. Pruning is a single DELETE of the profiles that
//! left the snapshot; customers are roots and nothing cascades (orders may
//! outlive their customer reference).

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use fresis_core::{Customer, SyncKind, SyncReport, SyncStage};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{
    checkpoint, fetch_records, finish, loop_checkpoint, SyncDeps, LABEL_PRUNE,
};
use crate::progress::ProgressSender;
use crate::snapshot::CustomerRecord;
use crate::store::{CustomerStore, UserDirectory};

/// Runs one customer sync for `user_id`.
pub async fn sync_customers<S>(
    deps: &SyncDeps<S, CustomerRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: CustomerStore + UserDirectory,
{
    let started = Instant::now();
    info!(user_id, "Customer sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, user_id, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(
        SyncKind::Customers,
        Some(user_id),
        report,
        outcome,
        started,
        progress,
    )
}

async fn run<S>(
    deps: &SyncDeps<S, CustomerRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    report: &mut SyncReport,
    snapshot_path: &mut Option<std::path::PathBuf>,
) -> SyncResult<()>
where
    S: CustomerStore + UserDirectory,
{
    let records = fetch_records(
        deps,
        SyncKind::Customers,
        Some(user_id),
        progress,
        stop,
        snapshot_path,
    )
    .await?;

    if records.is_empty() {
        // Absence-from-snapshot is the only delete signal, and an empty
        // export is indistinguishable from an upstream glitch: no pruning.
        debug!(user_id, "Empty customer snapshot, skipping reconciliation");
        return Ok(());
    }

    let existing = deps.store.customer_hashes(user_id).await?;
    let now = Utc::now().timestamp();

    let mut seen: Vec<String> = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(user_id, %reason, "Skipping invalid customer record");
            report.skipped += 1;
            continue;
        }

        let customer = customer_from_record(user_id, record, now);
        seen.push(customer.customer_profile.clone());

        match existing.get(&customer.customer_profile) {
            None => {
                deps.store.insert_customer(&customer).await?;
                report.inserted += 1;
            }
            Some(stored_hash) if *stored_hash == customer.hash => {
                deps.store
                    .touch_customer(user_id, &customer.customer_profile, now)
                    .await?;
                report.skipped += 1;
            }
            Some(_) => {
                deps.store.update_customer(&customer).await?;
                report.updated += 1;
            }
        }
    }

    checkpoint(stop, SyncStage::Prune)?;
    progress.report(80, LABEL_PRUNE);

    if !seen.is_empty() {
        report.deleted += deps.store.prune_customers(user_id, &seen).await?;
    }

    deps.store.stamp_customer_sync(user_id, now).await?;

    Ok(())
}

/// Maps a snapshot record onto the domain row, computing the content hash.
fn customer_from_record(user_id: &str, record: &CustomerRecord, now: i64) -> Customer {
    let mut customer = Customer {
        customer_profile: record.customer_profile.clone(),
        user_id: user_id.to_string(),
        business_name: record.business_name.clone(),
        vat_number: record.vat_number.clone(),
        fiscal_code: record.fiscal_code.clone(),
        address: record.address.clone(),
        city: record.city.clone(),
        province: record.province.clone(),
        postal_code: record.postal_code.clone(),
        country: record.country.clone(),
        phone: record.phone.clone(),
        mobile: record.mobile.clone(),
        email: record.email.clone(),
        pec_email: record.pec_email.clone(),
        sdi_code: record.sdi_code.clone(),
        contact_person: record.contact_person.clone(),
        payment_terms: record.payment_terms.clone(),
        payment_method: record.payment_method.clone(),
        iban: record.iban.clone(),
        bank_name: record.bank_name.clone(),
        price_list: record.price_list.clone(),
        discount_class: record.discount_class.clone(),
        sales_agent: record.sales_agent.clone(),
        delivery_address: record.delivery_address.clone(),
        delivery_city: record.delivery_city.clone(),
        delivery_province: record.delivery_province.clone(),
        delivery_postal_code: record.delivery_postal_code.clone(),
        notes: record.notes.clone(),
        hash: String::new(),
        last_sync: now,
    };
    customer.hash = customer.content_hash();
    customer
}
