use std::collections::HashSet;

use crate::record::{PreviewRecord, ServiceEntry, ServiceMetadata};

pub fn build_record<F>(
    catalog: &[String],
    target: &str,
    version: &str,
    metadata: F,
) -> PreviewRecord
where
    F: FnOnce() -> ServiceMetadata,
{
    let mut metadata = Some(metadata);
    let mut seen = HashSet::with_capacity(catalog.len());
    let mut services = Vec::with_capacity(catalog.len());

    for name in catalog {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if name == target {
            if let Some(factory) = metadata.take() {
                services.push(ServiceEntry::pinned(name.clone(), version, factory()));
                continue;
            }
        }
        services.push(ServiceEntry::tracking_default(name.clone()));
    }

    PreviewRecord {
        services,
        ..PreviewRecord::default()
    }
}

/// The entry keeps its position and any `created-at` it already had; every
/// other metadata field comes from `metadata`. A service the record has never
/// seen is appended at the end. No entry is removed or reordered.
pub fn update_record<F>(
    mut existing: PreviewRecord,
    target: &str,
    version: &str,
    metadata: F,
) -> PreviewRecord
where
    F: FnOnce() -> ServiceMetadata,
{
    let Some(index) = existing
        .services
        .iter()
        .position(|entry| entry.name == target)
    else {
        existing
            .services
            .push(ServiceEntry::pinned(target, version, metadata()));
        return existing;
    };

    let entry = &mut existing.services[index];
    let mut fresh = metadata();
    if let Some(created_at) = entry
        .metadata
        .as_ref()
        .and_then(|previous| previous.created_at.clone())
    {
        fresh.created_at = Some(created_at);
    }

    entry.version = Some(version.to_string());
    entry.metadata = Some(fresh);
    existing
}
