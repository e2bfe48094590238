//! Fleet locator. Resolves the set of instances a run touches.

use std::collections::HashSet;

use flotilla_core::{ConfigError, InstanceRef, SearchCriteria, SubscriptionId};
use flotilla_remote::{RemoteApi, Session};

use crate::error::SyncError;

/// Return `explicit` alone, or every instance matching `criteria`.
///
/// Search pages are concatenated in the order received until the endpoint
/// stops returning a cursor.
pub async fn locate(
    remote: &dyn RemoteApi,
    session: &Session,
    subscription: &SubscriptionId,
    explicit: Option<&InstanceRef>,
    criteria: &SearchCriteria,
) -> Result<Vec<InstanceRef>, SyncError> {
    if let Some(instance) = explicit {
        return Ok(vec![instance.clone()]);
    }
    if criteria.is_empty() {
        return Err(ConfigError::EmptyCriteria.into());
    }

    let mut items = Vec::new();
    let mut seen_cursors = HashSet::new();
    let mut next: Option<String> = None;
    loop {
        let page = remote
            .search(session, subscription, criteria, next.as_deref())
            .await?;
        tracing::debug!(
            page_items = page.items.len(),
            has_next = page.next.is_some(),
            "search page received",
        );
        items.extend(page.items);
        match page.next {
            Some(cursor) => {
                if !seen_cursors.insert(cursor.clone()) {
                    return Err(SyncError::Pagination { cursor });
                }
                next = Some(cursor);
            }
            None => break,
        }
    }

    tracing::info!(
        subscription = %subscription,
        criteria = %criteria,
        matched = items.len(),
        "identified matching functions",
    );
    Ok(items)
}
