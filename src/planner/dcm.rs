use std::collections::HashMap;

use tracing::warn;

/// Dynamic constraint manager: a multiset of directed edge constraints
/// `(from, to, to_timestep)`.
///
/// The enclosing solver adds and pops constraints in LIFO pairs; multiplicity
/// keeps an edge blocked while any addition is still outstanding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicConstraintManager {
    blocked: HashMap<(usize, usize, usize), u32>,
}

impl DynamicConstraintManager {
    pub fn add_edge(&mut self, from: usize, to: usize, to_timestep: usize) {
        *self.blocked.entry((from, to, to_timestep)).or_insert(0) += 1;
    }

    /// Decrements the multiplicity of an edge constraint. Popping an edge
    /// that was never added is caller misuse: diagnosed and ignored.
    pub fn pop_edge(&mut self, from: usize, to: usize, to_timestep: usize) {
        match self.blocked.get_mut(&(from, to, to_timestep)) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.blocked.remove(&(from, to, to_timestep));
            }
            None => {
                warn!(from, to, to_timestep, "popped an edge constraint that is not present");
            }
        }
    }

    pub fn is_blocked(&self, from: usize, to: usize, to_timestep: usize) -> bool {
        self.blocked.contains_key(&(from, to, to_timestep))
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}
