//! Secondary-index hooks for watch filtering.


#[cfg(test)]
use mockall::automock;

/// A (label, value) pair derived from a stored object's content.
///
/// Cheap secondary-index entries letting watch subscriptions pre-filter
/// changes without decoding full objects on the hot path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchValue {
    pub label: String,
    pub value: String,
}

impl MatchValue {
    pub fn new(
        label: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        MatchValue {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Per-resource-kind trigger extraction capability.
///
/// The storage layer calls [`extract_triggers`](TriggerExtractor::extract_triggers)
/// once per write to stamp change notifications, and again when evaluating
/// whether a subscription's filter matches an incoming change. A kind that
/// yields no trigger values falls back to full linear filtering through
/// [`matches`](TriggerExtractor::matches). Kinds whose watch filters are rare
/// implement the degenerate [`NoTrigger`] policy and pay no index-maintenance
/// cost.
#[cfg_attr(test, automock)]
pub trait TriggerExtractor: Send + Sync + 'static {
    fn extract_triggers(
        &self,
        payload: &[u8],
    ) -> Vec<MatchValue>;

    /// Linear fallback predicate evaluated when no trigger values exist for
    /// an object.
    fn matches(
        &self,
        payload: &[u8],
    ) -> bool;
}

/// The "no trigger" policy: yields no index values and matches every object.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrigger;

impl TriggerExtractor for NoTrigger {
    fn extract_triggers(
        &self,
        _payload: &[u8],
    ) -> Vec<MatchValue> {
        Vec::new()
    }

    fn matches(
        &self,
        _payload: &[u8],
    ) -> bool {
        true
    }
}
