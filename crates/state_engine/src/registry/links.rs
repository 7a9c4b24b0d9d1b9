use std::collections::HashSet;

use tracing::{debug, warn};

use super::types::{OwnerId, StateRequest};
use super::StateRegistry;

impl StateRegistry {
    /// Adds or removes the mirroring edge `original -> linked`.
    ///
    /// Linking replays every name currently active on `original` onto
    /// `linked`. Unlinking leaves `linked` as it is.
    pub fn link_owners(&mut self, original: OwnerId, linked: OwnerId, link: bool) {
        if original == linked {
            debug!(owner = %original, "state_self_link_ignored");
            return;
        }

        if !link {
            if let Some(edges) = self.links.get_mut(&original) {
                edges.retain(|edge| *edge != linked);
                if edges.is_empty() {
                    self.links.remove(&original);
                }
            }
            debug!(original = %original, linked = %linked, "state_owners_unlinked");
            return;
        }

        let edges = self.links.entry(original).or_default();
        if !edges.contains(&linked) {
            edges.push(linked);
        }
        debug!(original = %original, linked = %linked, "state_owners_linked");

        for name in self.active_state_names(original) {
            self.pending.push_back(StateRequest {
                owner: linked,
                name,
                active: true,
            });
        }
        self.drain_requests();
    }

    pub fn linked_owners(&self, original: OwnerId) -> &[OwnerId] {
        self.links
            .get(&original)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Records `parent` as the propagation parent of `child`. States
    /// initialized on `child` afterwards also answer to names set on every
    /// ancestor.
    pub fn set_parent(&mut self, child: OwnerId, parent: Option<OwnerId>) {
        match parent {
            Some(parent) if parent == child => {
                warn!(owner = %child, "state_parent_self_ignored");
            }
            Some(parent) => {
                if self.ancestors(parent).contains(&child) {
                    warn!(child = %child, parent = %parent, "state_parent_cycle_ignored");
                    return;
                }
                self.parents.insert(child, parent);
            }
            None => {
                self.parents.remove(&child);
            }
        }
    }

    pub fn parent(&self, owner: OwnerId) -> Option<OwnerId> {
        self.parents.get(&owner).copied()
    }

    /// Parent first, then its parent, and so on.
    pub fn ancestors(&self, owner: OwnerId) -> Vec<OwnerId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([owner]);
        let mut current = owner;
        while let Some(&parent) = self.parents.get(&current) {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }
}
