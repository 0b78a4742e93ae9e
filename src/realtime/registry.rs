// src/realtime/registry.rs
//! The subscriptions of one connection.
//!
//! Each subscription owns the [`FollowHandle`] of its follower, so removing a subscription,
//! replacing it, or dropping the whole registry cancels the follower. No other cleanup path exists.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::parser::ParsedLine;
use crate::reader::FollowHandle;

/// Which lines of a subscription get delivered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    /// Only entries with this level (case-insensitive).
    pub level: Option<String>,
    /// Only lines containing this text (case-insensitive).
    pub search: Option<String>,
}

impl Filter {
    /// Build a filter, ignoring blank criteria.
    #[must_use]
    pub fn new(level: Option<String>, search: Option<String>) -> Self {
        let non_blank = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        Self {
            level: non_blank(level),
            search: non_blank(search).map(|search| search.to_lowercase()),
        }
    }

    /// Whether `line` passes the filter.
    #[must_use]
    pub fn matches(&self, line: &ParsedLine) -> bool {
        if let Some(level) = &self.level {
            let matches_level = line
                .parsed
                .level
                .as_deref()
                .map_or(false, |actual| actual.eq_ignore_ascii_case(level));
            if !matches_level {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !line.raw.content.to_lowercase().contains(search.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A filter shared between a subscription and its follower's callback.
pub type SharedFilter = Arc<Mutex<Filter>>;

/// Check `line` against a shared filter.
#[must_use]
pub fn passes(filter: &SharedFilter, line: &ParsedLine) -> bool {
    filter
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .matches(line)
}

/// A live subscription.
pub struct Subscription {
    /// The followed file.
    pub file_path: PathBuf,
    /// The plugin owning the file.
    pub plugin_id: String,
    /// The log type lines are parsed as.
    pub log_type: String,
    /// The filter applied to delivered lines.
    pub filter: SharedFilter,
    /// The follower, if the subscription follows the file.
    pub handle: Option<FollowHandle>,
}

/// Subscriptions by client-chosen id.
#[derive(Default)]
pub struct Registry {
    subscriptions: HashMap<String, Subscription>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription, cancelling any previous subscription with the same id.
    pub fn insert(&mut self, id: String, subscription: Subscription) {
        if let Some(mut previous) = self.subscriptions.insert(id, subscription) {
            cancel(&mut previous);
        }
    }

    /// Cancel and remove a subscription. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.subscriptions.remove(id) {
            Some(mut subscription) => {
                cancel(&mut subscription);
                true
            }
            None => false,
        }
    }

    /// Look up a subscription.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    /// The number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Cancel and remove every subscription.
    pub fn clear(&mut self) {
        for (_, mut subscription) in self.subscriptions.drain() {
            cancel(&mut subscription);
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.clear();
    }
}

fn cancel(subscription: &mut Subscription) {
    if let Some(handle) = subscription.handle.as_mut() {
        handle.cancel();
    }
}
