//! Cleanup of bucket objects referenced by deleted rows, and a sweep that
//! removes objects no row references any more.

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{Backend, ObjectStore, Row};
use crate::config::Buckets;
use crate::constants::PUBLIC_PREFIX;
use crate::error::Result;
use crate::relocate::object_path_from_url;
use crate::repository::{PageRequest, Repository};
use crate::resources::{media_resources, FieldKind, ResourceSpec};

/// Rows fetched per page while collecting references
const SWEEP_PAGE_SIZE: u32 = 500;

/// Objects uploaded this recently are never swept; their row may not be written yet
const SWEEP_GRACE_MS: i64 = 15 * 60 * 1000;

/// `(bucket, object path)` of every media URL stored in a row
pub fn referenced_objects(spec: &ResourceSpec, row: &Row, buckets: &Buckets) -> Vec<(String, String)> {
    spec.file_fields()
        .filter_map(|field| {
            let bucket = match field.kind {
                FieldKind::File(kind) => buckets.name(kind),
                _ => return None,
            };
            let url = row.get(field.name).and_then(Value::as_str)?;
            let path = object_path_from_url(url)?;
            Some((bucket.to_string(), path))
        })
        .collect()
}

/// Delete a row, then remove its media.
///
/// Media removal is best-effort: failures are logged and the row stays deleted.
/// Returns the number of objects removed.
pub async fn delete_with_media(
    repo: &Repository,
    objects: &dyn ObjectStore,
    buckets: &Buckets,
    id: i64,
) -> Result<usize> {
    let spec = repo.spec();
    let row = repo.get(id).await?;
    repo.delete(id).await?;

    let mut by_bucket: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (bucket, path) in referenced_objects(spec, &row, buckets) {
        by_bucket.entry(bucket).or_default().push(path);
    }

    let mut removed = 0;
    for (bucket, paths) in by_bucket {
        match objects.remove(&bucket, &paths).await {
            Ok(()) => removed += paths.len(),
            Err(e) => warn!(
                "[{}] id {} deleted but its media in {} was not removed: {}",
                spec.name, id, bucket, e
            ),
        }
    }
    info!("[{}] deleted id {} ({} media object(s) removed)", spec.name, id, removed);
    Ok(removed)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub dry_run: bool,
    /// Objects found under the public prefix of every bucket
    pub scanned: usize,
    /// Distinct objects referenced by at least one row
    pub referenced: usize,
    /// Unreferenced objects skipped because they were uploaded moments ago
    pub skipped_recent: usize,
    /// `bucket/path` of every unreferenced object
    pub unreferenced: Vec<String>,
    pub removed: usize,
}

/// Upload timestamp embedded in a name of the form `<stem>_<ms>_<token>[.<ext>]`
fn upload_timestamp_ms(path: &str) -> Option<i64> {
    let name = path.rsplit('/').next()?;
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    let mut parts = stem.rsplitn(3, '_');
    let _token = parts.next()?;
    let ms = parts.next()?;
    parts.next()?;
    ms.parse().ok()
}

/// Every `(bucket, path)` referenced by a learning or practice row.
///
/// Rows are walked by id cursor, so rows deleted while the scan runs never
/// shift a later row out of view.
async fn collect_references(backend: &Backend, page_size: u32) -> Result<BTreeSet<(String, String)>> {
    let mut referenced = BTreeSet::new();
    for spec in media_resources() {
        let repo = Repository::new(backend.tables.clone(), spec);
        let mut after = None;
        loop {
            let mut request = PageRequest::new(1, page_size);
            if let Some(id) = after {
                request = request.starting_after(id);
            }
            let listing = repo.list(&request).await?;
            for row in &listing.items {
                referenced.extend(referenced_objects(spec, row, &backend.buckets));
            }
            let last_id = listing.items.last().and_then(|row| row.get("id")).and_then(Value::as_i64);
            match last_id {
                Some(id) if listing.items.len() == page_size as usize => after = Some(id),
                _ => break,
            }
        }
    }
    Ok(referenced)
}

/// Collect every referenced object, then remove (or with `dry_run` only report)
/// the objects under `public/` that no row references.
pub async fn sweep_media(backend: &Backend, dry_run: bool) -> Result<SweepReport> {
    sweep_media_paged(backend, dry_run, SWEEP_PAGE_SIZE).await
}

async fn sweep_media_paged(backend: &Backend, dry_run: bool, page_size: u32) -> Result<SweepReport> {
    let referenced = collect_references(backend, page_size).await?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut report = SweepReport {
        dry_run,
        referenced: referenced.len(),
        ..SweepReport::default()
    };

    let bucket_names: BTreeSet<&str> =
        [backend.buckets.videos.as_str(), backend.buckets.images.as_str()].into();
    for bucket in bucket_names {
        let listed = backend.objects.list(bucket, PUBLIC_PREFIX).await?;
        report.scanned += listed.len();

        let mut orphans = Vec::new();
        for path in listed {
            if referenced.contains(&(bucket.to_string(), path.clone())) {
                continue;
            }
            match upload_timestamp_ms(&path) {
                Some(ms) if now_ms - ms < SWEEP_GRACE_MS => {
                    report.skipped_recent += 1;
                    continue;
                }
                _ => {}
            }
            report.unreferenced.push(format!("{}/{}", bucket, path));
            orphans.push(path);
        }

        if dry_run || orphans.is_empty() {
            continue;
        }
        match backend.objects.remove(bucket, &orphans).await {
            Ok(()) => report.removed += orphans.len(),
            Err(e) => warn!("Failed to remove {} object(s) from {}: {}", orphans.len(), bucket, e),
        }
    }

    info!(
        "Media sweep{}: scanned {}, referenced {}, unreferenced {}, removed {}",
        if dry_run { " (dry run)" } else { "" },
        report.scanned,
        report.referenced,
        report.unreferenced.len(),
        report.removed
    );
    Ok(report)
}
