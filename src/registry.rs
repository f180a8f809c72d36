//! [`ParameterRegistry`]: the dense, id-recycling slot allocator behind
//! every parameter's [`SignalId`].

use crate::id::SignalId;
use crate::parameter::Parameter;
use std::collections::VecDeque;

/// Assigns, reuses and revokes [`SignalId`]s for the local parameter set.
///
/// Maintained by construction: every occupied slot's parameter carries its
/// own index as `sig_id`, every free index is both in `free` and empty, and
/// the tail never sits empty (`remove` of the physical tail shrinks `slots`
/// instead of leaving a hole).
#[derive(Default)]
pub struct ParameterRegistry {
    slots: Vec<Option<Parameter>>,
    free: VecDeque<usize>,
}

impl ParameterRegistry {
    /// Builds an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots currently in use (excludes the empty tail).
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True if no parameter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assigns a signal id to `param` and inserts it, FIFO-reusing the
    /// smallest freed id if one is available. If `param` already carries a
    /// `sig_id`, it is honored: if it equals the current slot count the
    /// parameter is appended there, otherwise the target slot is silently
    /// overwritten; see DESIGN.md for why this crate keeps that policy.
    pub fn insert(&mut self, mut param: Parameter) -> SignalId {
        let id = match param.sig_id() {
            Some(id) if id.index() == self.slots.len() => {
                self.slots.push(None);
                id
            }
            Some(id) => id,
            None => {
                if let Some(idx) = self.free.pop_front() {
                    SignalId::from(idx)
                } else {
                    let idx = self.slots.len();
                    self.slots.push(None);
                    SignalId::from(idx)
                }
            }
        };
        param.set_sig_id(Some(id));
        self.slots[id.index()] = Some(param);
        id
    }

    /// Removes the parameter at `id`, if any, freeing the id for reuse.
    /// Removing the physical tail shrinks `slots` and collapses any
    /// trailing holes left exposed by the shrink, instead of leaving them
    /// dangling in `free`.
    pub fn remove(&mut self, id: SignalId) -> Option<Parameter> {
        let idx = id.index();
        if idx >= self.slots.len() {
            return None;
        }
        let mut removed = self.slots[idx].take()?;
        removed.set_sig_id(None);
        if idx == self.slots.len() - 1 {
            self.slots.pop();
            while matches!(self.slots.last(), Some(None)) {
                let collapsed = self.slots.len() - 1;
                self.slots.pop();
                self.free.retain(|&i| i != collapsed);
            }
        } else {
            self.free.push_back(idx);
        }
        Some(removed)
    }

    /// Looks up a parameter by signal id.
    pub fn get(&self, id: SignalId) -> Option<&Parameter> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Mutably looks up a parameter by signal id.
    pub fn get_mut(&mut self, id: SignalId) -> Option<&mut Parameter> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Removes every parameter, resetting each one's `sig_id` to `None`.
    pub fn clear(&mut self) {
        for slot in self.slots.drain(..) {
            if let Some(mut param) = slot {
                param.set_sig_id(None);
            }
        }
        self.free.clear();
    }

    /// Iterates over every registered parameter.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Mutably iterates over every registered parameter.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Access, Value};

    fn param(name: &str) -> Parameter {
        Parameter::new(
            name.into(),
            Value::Float(1.0),
            Access::parse("rw"),
            None,
            vec![],
        )
    }

    #[test]
    fn s1_insert_remove_reuse() {
        let mut reg = ParameterRegistry::new();
        let p1 = reg.insert(param("p1"));
        let p2 = reg.insert(param("p2"));
        let p3 = reg.insert(param("p3"));
        assert_eq!((p1.0, p2.0, p3.0), (0, 1, 2));
        assert_eq!(reg.len(), 3);

        reg.remove(p2);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.slots.len(), 3);

        let p4 = reg.insert(param("p4"));
        assert_eq!(p4.0, 1);
        assert_eq!(reg.get(p4).unwrap().name(), "p4");

        reg.remove(p3);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.slots.len(), 2);
    }

    #[test]
    fn live_parameter_sig_id_matches_slot() {
        let mut reg = ParameterRegistry::new();
        let id = reg.insert(param("p"));
        assert_eq!(reg.get(id).unwrap().sig_id(), Some(id));
    }

    #[test]
    fn remove_then_insert_reuses_fifo() {
        let mut reg = ParameterRegistry::new();
        let a = reg.insert(param("a"));
        let b = reg.insert(param("b"));
        let _c = reg.insert(param("c"));
        reg.remove(a);
        reg.remove(b);
        // free = [a, b] in that order; next two inserts should reuse a then b.
        let first = reg.insert(param("d"));
        let second = reg.insert(param("e"));
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    #[test]
    fn clear_resets_every_parameter() {
        let mut reg = ParameterRegistry::new();
        reg.insert(param("a"));
        reg.insert(param("b"));
        reg.clear();
        assert_eq!(reg.len(), 0);
        assert!(reg.iter().next().is_none());
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let mut reg = ParameterRegistry::new();
        assert!(reg.remove(SignalId::from(42usize)).is_none());
    }
}
