//! Which services are live and which identity each one reports.

use std::collections::{BTreeMap, BTreeSet};

use meshcheck_services::{NodeIdentity, ServiceId};
use tracing::debug;

/// A membership mutation failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MembershipError {
    /// No live service has this id.
    #[error("service {0} is not a live member")]
    UnknownService(ServiceId),

    /// A live service already has this id.
    #[error("service {0} is already a live member")]
    AlreadyLive(ServiceId),
}

/// How a service joined the network.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    /// Started with the network.
    Boot,
    /// Added by a scenario.
    Added,
}

/// A point-in-time view of the network's membership.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MembershipState {
    live: BTreeMap<ServiceId, NodeIdentity>,
    origins: BTreeMap<ServiceId, Origin>,
}

impl MembershipState {
    /// The identity of live service `service_id`.
    pub fn identity(&self, service_id: ServiceId) -> Option<&NodeIdentity> {
        self.live.get(&service_id)
    }

    /// How `service_id` joined, even if it has since been removed.
    pub fn origin(&self, service_id: ServiceId) -> Option<Origin> {
        self.origins.get(&service_id).copied()
    }

    /// Is `service_id` a live boot member?
    pub fn is_live_boot(&self, service_id: ServiceId) -> bool {
        self.live.contains_key(&service_id) && self.origin(service_id) == Some(Origin::Boot)
    }

    /// Live services and their identities, ordered by id.
    pub fn live(&self) -> impl Iterator<Item = (ServiceId, &NodeIdentity)> {
        self.live.iter().map(|(id, identity)| (*id, identity))
    }

    /// Number of live services.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Are there no live services?
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live boot members and their identities.
    pub fn boot(&self) -> impl Iterator<Item = (ServiceId, &NodeIdentity)> {
        self.live()
            .filter(move |(id, _)| self.origin(*id) == Some(Origin::Boot))
    }

    /// Identities held by more than one live service.
    pub fn ambiguous_identities(&self) -> BTreeSet<&NodeIdentity> {
        let mut holders = BTreeMap::<&NodeIdentity, usize>::new();
        for identity in self.live.values() {
            *holders.entry(identity).or_default() += 1;
        }
        holders
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(identity, _)| identity)
            .collect()
    }

    /// Identities of every live service.
    pub fn identities(&self) -> BTreeSet<&NodeIdentity> {
        self.live.values().collect()
    }
}

/// Something that happened to the membership.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MembershipEvent {
    /// A service joined.
    Registered {
        /// The service.
        service_id: ServiceId,
        /// The identity it reported.
        identity: NodeIdentity,
        /// How it joined.
        origin: Origin,
    },
    /// A service left.
    Removed {
        /// The service.
        service_id: ServiceId,
        /// The identity it held.
        identity: NodeIdentity,
    },
}

/// Tracks membership as a scenario mutates the network.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    state: MembershipState,
    events: Vec<MembershipEvent>,
}

impl MembershipTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that boot member `service_id` reports `identity`.
    pub fn register_boot(
        &mut self,
        service_id: ServiceId,
        identity: NodeIdentity,
    ) -> Result<(), MembershipError> {
        self.register(service_id, identity, Origin::Boot)
    }

    /// Records that added service `service_id` reports `identity`.
    pub fn register_added(
        &mut self,
        service_id: ServiceId,
        identity: NodeIdentity,
    ) -> Result<(), MembershipError> {
        self.register(service_id, identity, Origin::Added)
    }

    fn register(
        &mut self,
        service_id: ServiceId,
        identity: NodeIdentity,
        origin: Origin,
    ) -> Result<(), MembershipError> {
        if self.state.live.contains_key(&service_id) {
            return Err(MembershipError::AlreadyLive(service_id));
        }
        debug!(%service_id, %identity, ?origin, "registered member");
        self.state.live.insert(service_id, identity.clone());
        self.state.origins.insert(service_id, origin);
        self.events.push(MembershipEvent::Registered {
            service_id,
            identity,
            origin,
        });
        Ok(())
    }

    /// Records that `service_id` left the network.
    pub fn remove(&mut self, service_id: ServiceId) -> Result<(), MembershipError> {
        let identity = self
            .state
            .live
            .remove(&service_id)
            .ok_or(MembershipError::UnknownService(service_id))?;
        debug!(%service_id, %identity, "removed member");
        self.events.push(MembershipEvent::Removed {
            service_id,
            identity,
        });
        Ok(())
    }

    /// The current membership.
    pub fn snapshot(&self) -> MembershipState {
        self.state.clone()
    }

    /// Every mutation so far, oldest first.
    pub fn events(&self) -> &[MembershipEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_register_and_remove() {
        let mut tracker = MembershipTracker::new();
        tracker.register_boot(ServiceId(1000), "a".into()).unwrap();
        tracker.register_added(ServiceId(1), "b".into()).unwrap();

        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.is_live_boot(ServiceId(1000)));
        assert!(!snap.is_live_boot(ServiceId(1)));

        tracker.remove(ServiceId(1)).unwrap();
        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.identity(ServiceId(1)), None);
        assert_eq!(snap.origin(ServiceId(1)), Some(Origin::Added));

        assert_eq!(
            tracker.events().last(),
            Some(&MembershipEvent::Removed {
                service_id: ServiceId(1),
                identity: "b".into(),
            })
        );
    }

    #[test]
    fn test_register_live_id_fails() {
        let mut tracker = MembershipTracker::new();
        tracker.register_boot(ServiceId(1000), "a".into()).unwrap();
        assert_eq!(
            tracker.register_added(ServiceId(1000), "b".into()),
            Err(MembershipError::AlreadyLive(ServiceId(1000)))
        );
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mut tracker = MembershipTracker::new();
        assert_eq!(
            tracker.remove(ServiceId(7)),
            Err(MembershipError::UnknownService(ServiceId(7)))
        );
    }

    #[test]
    fn test_id_reuse_after_removal() {
        let mut tracker = MembershipTracker::new();
        tracker.register_added(ServiceId(1), "a".into()).unwrap();
        tracker.remove(ServiceId(1)).unwrap();
        tracker.register_added(ServiceId(1), "c".into()).unwrap();
        assert_eq!(
            tracker.snapshot().identity(ServiceId(1)),
            Some(&NodeIdentity::from("c"))
        );
        assert_eq!(tracker.events().len(), 3);
    }

    #[test]
    fn test_ambiguous_identities() {
        let mut tracker = MembershipTracker::new();
        tracker.register_boot(ServiceId(1000), "a".into()).unwrap();
        tracker.register_added(ServiceId(1), "dup".into()).unwrap();
        tracker.register_added(ServiceId(2), "dup".into()).unwrap();

        let snap = tracker.snapshot();
        let dup = NodeIdentity::from("dup");
        assert_eq!(snap.ambiguous_identities(), BTreeSet::from([&dup]));
        assert_eq!(snap.identities().len(), 2);
    }
}
