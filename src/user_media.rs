// Copyright 2024 Galaxy Project Committers.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Per-user "plugged media" selection (spec C8 `UserMediaResolver`).
//!
//! Picks which of a user's own storage targets — or the instance-level
//! default — should serve one operation, honoring per-medium quotas and
//! falling through to a lower-order medium (or the instance default) when a
//! pick fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::backend::Backend;
use crate::disk::DiskBackend;
use crate::error::{Error, Result};
use crate::object::{LogicalObject, MediaCategory, PluggedMedium};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies whether the user still has room on the instance-level default
/// medium. Out of scope for this crate (spec §1: "the dataset/user/quota
/// database"); the host implements this against its own quota accounting.
pub trait InstanceQuotaSource: Send + Sync {
    fn has_instance_quota(&self) -> bool;
}

/// Always reports quota available — a reasonable default for hosts that
/// haven't wired up instance-level quota accounting yet.
pub struct UnlimitedInstanceQuota;

impl InstanceQuotaSource for UnlimitedInstanceQuota {
    fn has_instance_quota(&self) -> bool {
        true
    }
}

/// Constructs the concrete backend for a non-`LOCAL` plugged medium. Cloud
/// categories are out of scope for this crate (spec §1); a host that wants
/// to route user media onto S3/Azure/Swift/iRODS/Pithos supplies one of
/// these to bridge to its own adapter implementations. `LOCAL` never calls
/// this — it's always a plain [`DiskBackend`] built in-crate.
pub trait MediumBackendFactory: Send + Sync {
    fn build(&self, medium: &PluggedMedium) -> Result<Arc<dyn Backend>>;
}

/// The outcome of one selection pass: either a specific plugged medium, or
/// "fall through to the instance-level default" (spec §4.8 step 2's "return
/// null").
enum Selection {
    Medium(PluggedMedium),
    InstanceDefault,
}

/// Walks `media` from the highest order down to the lowest, applying spec
/// §4.8's tiered rule: positive orders are preferred over instance storage,
/// negative orders are fallbacks after it, and `order == 0` belongs to the
/// instance default alone and never appears in a user's own list.
///
/// `cursor` narrows the window on a retry: `from_order` is the order of a
/// medium that just failed, and this call must not reconsider it or any
/// medium at or above its order within the same tier.
///
/// Spec §9 flags the original implementation's literal fallback-tier bound
/// (`from_order <= order < -1`) as probably unintentional — it excludes
/// `order == -1` outright, which would make the worked example in spec §8
/// scenario 6 (reroute from a failed `order = 1` medium to `order = -1`)
/// impossible on the very first fallback attempt. This implementation uses
/// the symmetric bound `order <= cursor` for the negative tier instead; see
/// DESIGN.md for the full writeup of that decision.
fn select_medium(
    media: &[PluggedMedium],
    from_order: Option<i32>,
    dataset_size: u64,
    enough_quota_on_instance: bool,
) -> Result<Selection> {
    if media.is_empty() {
        return Ok(Selection::InstanceDefault);
    }

    let mut sorted: Vec<&PluggedMedium> = media.iter().collect();
    sorted.sort_by_key(|m| m.order);

    let cursor = match from_order {
        Some(order) => order - 1,
        None => sorted.last().map(|m| m.order).unwrap_or(0),
    };

    // Preferred tier: positive orders at or below the cursor, highest first.
    let mut positives: Vec<&PluggedMedium> =
        sorted.iter().copied().filter(|m| m.order > 0 && m.order <= cursor).collect();
    positives.sort_by(|a, b| b.order.cmp(&a.order));
    for medium in positives {
        if medium.has_room_for(dataset_size) {
            return Ok(Selection::Medium(medium.clone()));
        }
    }

    // Crossing zero: preferred tier is exhausted (either empty, or none had
    // room). If the instance default still has quota, use it.
    if enough_quota_on_instance {
        return Ok(Selection::InstanceDefault);
    }

    // Fallback tier: negative orders. Once the cursor itself has gone
    // negative (we're retrying after a failed fallback medium) restrict to
    // strictly lower orders; otherwise (first entry into this tier) every
    // fallback medium is still a candidate.
    let mut negatives: Vec<&PluggedMedium> = sorted
        .iter()
        .copied()
        .filter(|m| m.order < 0 && (cursor >= 0 || m.order <= cursor))
        .collect();
    negatives.sort_by(|a, b| b.order.cmp(&a.order));
    for medium in negatives {
        if medium.has_room_for(dataset_size) {
            return Ok(Selection::Medium(medium.clone()));
        }
    }

    Err(Error::QuotaExceeded(
        "no plugged medium has room and the instance-level default is also over quota".into(),
    ))
}

/// Selects and dispatches operations across a user's plugged media, falling
/// through to the instance-level default backend on exhaustion or failure.
pub struct UserMediaResolver {
    media: Vec<PluggedMedium>,
    /// Backend for each medium, keyed by `PluggedMedium::id`.
    medium_backends: std::collections::HashMap<String, Arc<dyn Backend>>,
    /// Ordinal 0 in the resolver's backend map (spec §4.8's dispatch
    /// wrapper): the instance-level default, used whenever selection
    /// crosses zero or a medium pick exhausts the retry budget.
    instance_default: Arc<dyn Backend>,
    instance_quota: Arc<dyn InstanceQuotaSource>,
}

impl UserMediaResolver {
    /// Builds a concrete backend for each medium: `LOCAL` becomes a
    /// [`DiskBackend`] rooted at `medium.path`, everything else is delegated
    /// to `cloud_factory`. Spec §9 flags the original's `__configure_store`
    /// as reading `self.media.get_config()` in the cloud branch as if the
    /// list itself exposed that method — the spec's own resolution is to
    /// call `medium.get_config()` in both branches, which here means both
    /// branches take the same `&PluggedMedium` and differ only in which
    /// backend type they build from it.
    pub fn new(
        media: Vec<PluggedMedium>,
        instance_default: Arc<dyn Backend>,
        instance_quota: Arc<dyn InstanceQuotaSource>,
        cloud_factory: Option<&dyn MediumBackendFactory>,
    ) -> Result<Self> {
        let mut medium_backends = std::collections::HashMap::new();
        for medium in &media {
            let backend: Arc<dyn Backend> = match medium.category {
                MediaCategory::Local => Arc::new(DiskBackend::new(
                    medium.id.clone(),
                    medium.path.clone(),
                    crate::object::StoreBy::Id,
                    false,
                    0o022,
                    None,
                    std::collections::HashMap::new(),
                )),
                _ => match cloud_factory {
                    Some(factory) => factory.build(medium)?,
                    None => {
                        return Err(Error::Unrecognized(format!(
                            "no cloud backend factory configured for medium category {:?}",
                            medium.category
                        )))
                    }
                },
            };
            medium_backends.insert(medium.id.clone(), backend);
        }
        Ok(UserMediaResolver {
            media,
            medium_backends,
            instance_default,
            instance_quota,
        })
    }

    fn select(&self, from_order: Option<i32>, dataset_size: u64) -> Result<Selection> {
        select_medium(
            &self.media,
            from_order,
            dataset_size,
            self.instance_quota.has_instance_quota(),
        )
    }

    /// Runs one operation across at most `1 + len(media)` picks (spec
    /// §4.8's dispatch wrapper): each pick invokes `call` against the
    /// selected backend; a retryable error (spec §7: `Io`) re-enters
    /// selection with the cursor lowered past the failed medium's order.
    /// Any other error, or exhaustion of the retry budget, surfaces as-is.
    pub async fn dispatch<T>(
        &self,
        dataset_size: u64,
        call: impl for<'a> Fn(&'a dyn Backend) -> BoxFuture<'a, Result<T>>,
    ) -> Result<T> {
        let attempts = 1 + self.media.len();
        let mut from_order: Option<i32> = None;
        let mut last_err = Error::QuotaExceeded("no plugged media configured".into());

        for _ in 0..attempts {
            let selection = match self.select(from_order, dataset_size) {
                Ok(s) => s,
                Err(e) => return Err(e),
            };
            let (backend, picked_order) = match &selection {
                Selection::Medium(medium) => (
                    self.medium_backends.get(&medium.id).unwrap_or(&self.instance_default),
                    Some(medium.order),
                ),
                Selection::InstanceDefault => (&self.instance_default, None),
            };
            match call(backend.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    log::warn!(
                        "plugged medium {:?} failed, trying a lower-order option: {e}",
                        picked_order
                    );
                    last_err = e;
                    from_order = match picked_order {
                        Some(order) => Some(order),
                        // The instance default itself failed: nothing lower
                        // to fall back to.
                        None => return Err(last_err),
                    };
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medium(id: &str, order: i32, quota: u64, usage: u64) -> PluggedMedium {
        PluggedMedium {
            id: id.to_string(),
            category: MediaCategory::Local,
            path: std::path::PathBuf::from("/tmp"),
            order,
            quota,
            usage,
        }
    }

    #[test]
    fn empty_media_defers_to_instance_default() {
        let result = select_medium(&[], None, 0, true).unwrap();
        assert!(matches!(result, Selection::InstanceDefault));
    }

    #[test]
    fn first_pick_is_highest_positive_order_with_room() {
        let media = vec![medium("a", 1, 1000, 900), medium("b", -1, 1000, 0)];
        let result = select_medium(&media, None, 0, false).unwrap();
        match result {
            Selection::Medium(m) => assert_eq!(m.id, "a"),
            _ => panic!("expected a medium"),
        }
    }

    #[test]
    fn failed_positive_medium_falls_through_to_negative_one() {
        let media = vec![medium("a", 1, 1000, 900), medium("b", -1, 1000, 0)];
        // from_order = 1 mirrors retrying after medium "a" failed.
        let result = select_medium(&media, Some(1), 0, false).unwrap();
        match result {
            Selection::Medium(m) => assert_eq!(m.id, "b"),
            _ => panic!("expected a medium"),
        }
    }

    #[test]
    fn exhausted_preferred_tier_with_instance_quota_uses_default() {
        let media = vec![medium("a", 1, 1000, 1000)];
        let result = select_medium(&media, None, 0, true).unwrap();
        assert!(matches!(result, Selection::InstanceDefault));
    }

    #[test]
    fn no_quota_anywhere_is_quota_exceeded() {
        let media = vec![medium("a", 1, 1000, 1000), medium("b", -1, 1000, 1000)];
        let err = select_medium(&media, None, 0, false).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[test]
    fn second_fallback_medium_requires_strictly_lower_order() {
        let media = vec![medium("a", -1, 1000, 1000), medium("b", -2, 1000, 0)];
        // Both media are negative-only; first pass (no instance quota) picks
        // the highest (least negative) with room, which is "b" since "a" is
        // full. Retrying after "b" (from_order=-2) must not reconsider it.
        let first = select_medium(&media, None, 0, false).unwrap();
        match first {
            Selection::Medium(m) => assert_eq!(m.id, "b"),
            _ => panic!("expected a medium"),
        }
        let err = select_medium(&media, Some(-2), 0, false).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }
}
