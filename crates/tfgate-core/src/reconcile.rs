//! State snapshot comparison and merge.
//!
//! Two snapshots of the same infrastructure can come from independent
//! producers — the hand-authored configuration and an auto-discovered
//! import — which name the same underlying object differently. The
//! domain rule here is therefore: resources are identified by their
//! type and attributes, never by their name, and snapshot serial and
//! lineage metadata are ignored entirely.
//!
//! `merge` is a simple union: discovered resources with no structural
//! match in the target are appended, names preserved as their producer
//! wrote them, and the target serial is bumped. There is no field-level
//! reconciliation of "the same" resource.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TfgateError};
use crate::io;

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// One managed infrastructure object inside a state snapshot.
///
/// Attribute values are structurally recursive (scalars, lists, nested
/// mappings), so they are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// An ordered collection of resources plus snapshot metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub lineage: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

fn default_version() -> u64 {
    4
}

impl StateSnapshot {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        io::atomic_write(path, &data)
    }
}

// ---------------------------------------------------------------------------
// MatchPolicy
// ---------------------------------------------------------------------------

/// How two resources are judged to be the same underlying object.
///
/// The name-insensitive comparison is a domain rule, but matching on
/// the full attribute map can collapse two genuinely distinct resources
/// of the same type with coincidentally identical attributes. Deployments
/// that care can designate an identifying attribute subset instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Identity = type + the full attribute map (upstream behavior).
    TypeAndAttributes,
    /// Identity = type + the named attributes only (stronger identity,
    /// e.g. `["id"]` or `["arn"]`). Resources missing a designated
    /// attribute fall back to a null placeholder for that slot.
    TypeAndDesignatedAttrs { attrs: Vec<String> },
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::TypeAndAttributes
    }
}

/// Canonical identity key for a resource under `policy`. Built from a
/// sorted copy of the attribute pairs so the key never depends on the
/// order a producer wrote them in.
fn fingerprint(resource: &Resource, policy: &MatchPolicy) -> String {
    let attrs: Vec<(String, serde_json::Value)> = match policy {
        MatchPolicy::TypeAndAttributes => {
            let mut pairs: Vec<_> = resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        }
        MatchPolicy::TypeAndDesignatedAttrs { attrs } => {
            let mut names = attrs.clone();
            names.sort();
            names
                .into_iter()
                .map(|name| {
                    let value = resource
                        .attributes
                        .get(&name)
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    (name, value)
                })
                .collect()
        }
    };
    // The resource name is deliberately excluded.
    match serde_json::to_string(&(&resource.kind, attrs)) {
        Ok(key) => key,
        // Unreachable for these value types; the sentinel keeps kinds
        // distinct rather than collapsing everything onto "".
        Err(_) => format!("!unserializable:{}", resource.kind),
    }
}

fn fingerprint_counts<'a>(
    resources: impl IntoIterator<Item = &'a Resource>,
    policy: &MatchPolicy,
) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for r in resources {
        *counts.entry(fingerprint(r, policy)).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Structural equality of two snapshots: the same multiset of
/// (type, attributes-under-policy) resources, irrespective of order,
/// name, serial, and lineage.
pub fn are_equivalent(a: &StateSnapshot, b: &StateSnapshot, policy: &MatchPolicy) -> bool {
    fingerprint_counts(&a.resources, policy) == fingerprint_counts(&b.resources, policy)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Union `discovered` into `target`: append every discovered resource
/// with no structural match in the target, preserving its name, and bump
/// the target serial. Returns the merged snapshot and how many
/// resources were appended.
pub fn merge(
    target: &StateSnapshot,
    discovered: &StateSnapshot,
    policy: &MatchPolicy,
) -> (StateSnapshot, usize) {
    let mut remaining = fingerprint_counts(&target.resources, policy);

    let mut merged = target.clone();
    let mut added = 0;
    for resource in &discovered.resources {
        let fp = fingerprint(resource, policy);
        match remaining.get_mut(&fp) {
            // Matches an existing target resource; the target wins by
            // simple union, so the discovered copy is dropped.
            Some(n) if *n > 0 => *n -= 1,
            _ => {
                merged.resources.push(resource.clone());
                added += 1;
            }
        }
    }
    merged.serial = target.serial + 1;
    (merged, added)
}

/// Merge on disk: back up `target_path`, parse both snapshots, merge,
/// and atomically replace `target_path` with the result.
///
/// Bounded by `timeout`; the backup happens before any mutation and the
/// final write is atomic, so an expired or failed merge leaves the
/// pre-merge snapshot recoverable and `target_path` never partial.
pub async fn merge_state_files(
    target_path: &Path,
    discovered_path: &Path,
    policy: &MatchPolicy,
    timeout: Duration,
) -> Result<StateSnapshot> {
    match tokio::time::timeout(timeout, merge_files(target_path, discovered_path, policy)).await {
        Ok(result) => result,
        // The inner future is dropped at its last reached await point,
        // so an expired merge never gets to the final write.
        Err(_) => Err(TfgateError::ReconcileTimeout(timeout.as_secs())),
    }
}

async fn merge_files(
    target_path: &Path,
    discovered_path: &Path,
    policy: &MatchPolicy,
) -> Result<StateSnapshot> {
    let backup = io::backup_path(target_path);
    tokio::fs::copy(target_path, &backup).await?;
    debug!(backup = %backup.display(), "backed up target snapshot");

    let raw_target = tokio::fs::read(target_path).await?;
    let raw_discovered = tokio::fs::read(discovered_path).await?;
    let target: StateSnapshot = serde_json::from_slice(&raw_target)?;
    let discovered: StateSnapshot = serde_json::from_slice(&raw_discovered)?;

    let (merged, added) = merge(&target, &discovered, policy);
    merged.write(target_path)?;

    info!(
        added,
        serial = merged.serial,
        target = %target_path.display(),
        "merged discovered resources into target snapshot"
    );
    Ok(merged)
}
