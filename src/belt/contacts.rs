//! Contact tracker — which bodies are currently resting on the belt.
//!
//! Fed by contact-begin/end events from the physics collaborator.  Both
//! operations are total: a repeated begin is absorbed, an end for a body
//! that was never seen is ignored.  Fast bodies can make the physics engine
//! miss one side of a pair, so neither case is treated as an error.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

/// Opaque identity of a physics body, assigned by the physics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// Set of bodies in contact with the belt surface.
#[derive(Debug, Default)]
pub struct ContactSet {
    bodies: HashSet<BodyId>,
}

impl ContactSet {
    pub fn new() -> Self {
        Self {
            bodies: HashSet::new(),
        }
    }

    /// Record that `body` touched the surface.
    /// Returns `true` if it was not already tracked.
    pub fn on_contact_begin(&mut self, body: BodyId) -> bool {
        let added = self.bodies.insert(body);
        if added {
            debug!("Contacts: {:?} on belt ({} total)", body, self.bodies.len());
        }
        added
    }

    /// Record that `body` left the surface.
    /// Returns `true` if it was tracked.
    pub fn on_contact_end(&mut self, body: BodyId) -> bool {
        let removed = self.bodies.remove(&body);
        if removed {
            debug!("Contacts: {:?} left belt ({} total)", body, self.bodies.len());
        } else {
            debug!("Contacts: end for untracked {:?} ignored", body);
        }
        removed
    }

    pub fn contains(&self, body: BodyId) -> bool {
        self.bodies.contains(&body)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Iterate the tracked bodies (unordered).
    pub fn iter(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.iter().copied()
    }
}
