//! Subscription registry and device-wide active feature set.
//!
//! One mutex guards both: every transition validates compatibility and
//! applies inside a single critical section, so the compatibility invariant
//! holds after every subscribe/unsubscribe/enable/disable/close and a
//! rejected transition leaves no trace. Critical sections are short and
//! synchronous; feature edges are applied to the device by the caller,
//! outside the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use band_types::{CommandError, SignalType};
use uuid::Uuid;

use crate::compat;

pub type ConnectionId = Uuid;

/// A device-visible activation edge produced by a registry transition. The
/// caller forwards these to the DeviceBridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureEdge {
    Activated(SignalType),
    Deactivated(SignalType),
}

#[derive(Default)]
struct RegistryInner {
    /// Per-connection subscription sets
    subscriptions: HashMap<ConnectionId, HashSet<SignalType>>,
    /// Subscriber count per signal across all connections
    subscriber_counts: HashMap<SignalType, usize>,
    /// Explicit `enable` pins, tracked per connection so a disconnecting
    /// client cannot leave a feature dangling
    pins: HashMap<ConnectionId, HashSet<SignalType>>,
}

impl RegistryInner {
    fn is_active(&self, signal: SignalType) -> bool {
        self.subscriber_counts.get(&signal).copied().unwrap_or(0) > 0
            || self.pins.values().any(|set| set.contains(&signal))
    }

    fn active_set(&self) -> HashSet<SignalType> {
        SignalType::ALL
            .into_iter()
            .filter(|s| self.is_active(*s))
            .collect()
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn`'s interest in `signal`. Idempotent. Returns the
    /// activation edge if this was the first subscriber device-wide.
    pub fn subscribe(
        &self,
        conn: ConnectionId,
        signal: SignalType,
    ) -> Result<Option<FeatureEdge>, CommandError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .subscriptions
            .get(&conn)
            .is_some_and(|set| set.contains(&signal))
        {
            return Ok(None);
        }
        let active = inner.active_set();
        compat::can_enable(signal, &active)?;
        let was_active = active.contains(&signal);
        inner.subscriptions.entry(conn).or_default().insert(signal);
        *inner.subscriber_counts.entry(signal).or_insert(0) += 1;
        Ok((!was_active).then_some(FeatureEdge::Activated(signal)))
    }

    /// Removes `conn`'s interest in `signal`. A no-op if not subscribed.
    pub fn unsubscribe(&self, conn: ConnectionId, signal: SignalType) -> Option<FeatureEdge> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner
            .subscriptions
            .get_mut(&conn)
            .is_some_and(|set| set.remove(&signal));
        if !removed {
            return None;
        }
        if let Some(count) = inner.subscriber_counts.get_mut(&signal) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.subscriber_counts.remove(&signal);
            }
        }
        (!inner.is_active(signal)).then_some(FeatureEdge::Deactivated(signal))
    }

    /// Pins `signal` active on behalf of `conn` (the `enable` command).
    /// Idempotent per connection.
    pub fn enable(
        &self,
        conn: ConnectionId,
        signal: SignalType,
    ) -> Result<Option<FeatureEdge>, CommandError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pins.get(&conn).is_some_and(|set| set.contains(&signal)) {
            return Ok(None);
        }
        let active = inner.active_set();
        compat::can_enable(signal, &active)?;
        let was_active = active.contains(&signal);
        inner.pins.entry(conn).or_default().insert(signal);
        Ok((!was_active).then_some(FeatureEdge::Activated(signal)))
    }

    /// Clears `conn`'s pin on `signal`. The feature stays active while other
    /// subscribers or pins remain.
    pub fn disable(&self, conn: ConnectionId, signal: SignalType) -> Option<FeatureEdge> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner
            .pins
            .get_mut(&conn)
            .is_some_and(|set| set.remove(&signal));
        if !removed {
            return None;
        }
        (!inner.is_active(signal)).then_some(FeatureEdge::Deactivated(signal))
    }

    /// Atomically removes all state owned by `conn`. Returns the
    /// deactivation edges for signals that thereby became inactive.
    pub fn remove_connection(&self, conn: ConnectionId) -> Vec<FeatureEdge> {
        let mut inner = self.inner.lock().unwrap();
        let mut touched: HashSet<SignalType> = HashSet::new();

        if let Some(subs) = inner.subscriptions.remove(&conn) {
            for signal in subs {
                touched.insert(signal);
                if let Some(count) = inner.subscriber_counts.get_mut(&signal) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        inner.subscriber_counts.remove(&signal);
                    }
                }
            }
        }
        if let Some(pins) = inner.pins.remove(&conn) {
            touched.extend(pins);
        }

        let mut edges: Vec<FeatureEdge> = touched
            .into_iter()
            .filter(|s| !inner.is_active(*s))
            .map(FeatureEdge::Deactivated)
            .collect();
        edges.sort_by_key(|edge| match edge {
            FeatureEdge::Activated(s) | FeatureEdge::Deactivated(s) => *s,
        });
        edges
    }

    pub fn subscriptions_of(&self, conn: ConnectionId) -> Vec<SignalType> {
        let inner = self.inner.lock().unwrap();
        let mut signals: Vec<SignalType> = inner
            .subscriptions
            .get(&conn)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        signals.sort();
        signals
    }

    pub fn subscribers_of(&self, signal: SignalType) -> Vec<ConnectionId> {
        let inner = self.inner.lock().unwrap();
        inner
            .subscriptions
            .iter()
            .filter(|(_, set)| set.contains(&signal))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn active_features(&self) -> Vec<SignalType> {
        let inner = self.inner.lock().unwrap();
        let mut active: Vec<SignalType> = inner.active_set().into_iter().collect();
        active.sort();
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent_and_refcounted() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(
            registry.subscribe(a, SignalType::Gesture).unwrap(),
            Some(FeatureEdge::Activated(SignalType::Gesture))
        );
        // Same connection again: no-op
        assert_eq!(registry.subscribe(a, SignalType::Gesture).unwrap(), None);
        // Second connection: feature already active, no edge
        assert_eq!(registry.subscribe(b, SignalType::Gesture).unwrap(), None);

        // First unsubscribe leaves the other subscriber holding the feature
        assert_eq!(registry.unsubscribe(a, SignalType::Gesture), None);
        assert_eq!(
            registry.unsubscribe(b, SignalType::Gesture),
            Some(FeatureEdge::Deactivated(SignalType::Gesture))
        );
        // Unsubscribing a signal not held is a no-op, not an error
        assert_eq!(registry.unsubscribe(b, SignalType::Gesture), None);
    }

    #[test]
    fn resubscribe_after_disable_reactivates() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        for _ in 0..3 {
            assert_eq!(
                registry.subscribe(a, SignalType::Snc).unwrap(),
                Some(FeatureEdge::Activated(SignalType::Snc))
            );
            assert_eq!(
                registry.unsubscribe(a, SignalType::Snc),
                Some(FeatureEdge::Deactivated(SignalType::Snc))
            );
        }
    }

    #[test]
    fn conflict_across_connections_leaves_state_untouched() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.subscribe(a, SignalType::ImuAcc).unwrap();
        let err = registry.subscribe(b, SignalType::Navigation).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.conflict_with(), Some(SignalType::ImuAcc));

        // The rejected transition must not have partially applied.
        assert!(registry.subscriptions_of(b).is_empty());
        assert_eq!(registry.active_features(), vec![SignalType::ImuAcc]);
        assert_eq!(registry.subscribers_of(SignalType::Navigation), Vec::<Uuid>::new());
    }

    #[test]
    fn pins_keep_features_active_without_subscribers() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();

        assert_eq!(
            registry.enable(a, SignalType::Pressure).unwrap(),
            Some(FeatureEdge::Activated(SignalType::Pressure))
        );
        assert_eq!(registry.enable(a, SignalType::Pressure).unwrap(), None);
        assert_eq!(registry.active_features(), vec![SignalType::Pressure]);

        assert_eq!(
            registry.disable(a, SignalType::Pressure),
            Some(FeatureEdge::Deactivated(SignalType::Pressure))
        );
        assert!(registry.active_features().is_empty());
    }

    #[test]
    fn disable_does_not_kill_a_subscribed_feature() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.subscribe(a, SignalType::Battery).unwrap();
        registry.enable(b, SignalType::Battery).unwrap();

        // b's disable clears only its own pin; a still subscribes.
        assert_eq!(registry.disable(b, SignalType::Battery), None);
        assert_eq!(registry.active_features(), vec![SignalType::Battery]);
    }

    #[test]
    fn pinned_feature_still_blocks_conflicts() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.enable(a, SignalType::Navigation).unwrap();
        let err = registry.subscribe(b, SignalType::ImuGyro).unwrap_err();
        assert_eq!(err.conflict_with(), Some(SignalType::Navigation));
    }

    #[test]
    fn remove_connection_releases_everything_it_held() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.subscribe(a, SignalType::Gesture).unwrap();
        registry.subscribe(a, SignalType::ImuAcc).unwrap();
        registry.enable(a, SignalType::Snc).unwrap();
        registry.subscribe(b, SignalType::Gesture).unwrap();

        let edges = registry.remove_connection(a);
        assert_eq!(
            edges,
            vec![
                FeatureEdge::Deactivated(SignalType::ImuAcc),
                FeatureEdge::Deactivated(SignalType::Snc),
            ]
        );
        // gesture survives through b's subscription
        assert_eq!(registry.active_features(), vec![SignalType::Gesture]);
        assert!(registry.subscriptions_of(a).is_empty());

        // navigation is now permitted again
        assert!(registry.subscribe(b, SignalType::Navigation).is_ok());
    }

    #[test]
    fn queries_before_any_subscription_return_empty() {
        let registry = SubscriptionRegistry::new();
        let a = Uuid::new_v4();
        assert!(registry.subscriptions_of(a).is_empty());
        assert!(registry.active_features().is_empty());
        assert!(registry.subscribers_of(SignalType::Gesture).is_empty());
    }
}
