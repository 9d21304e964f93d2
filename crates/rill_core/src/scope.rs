//! Arena of variable scope frames.
//!
//! Each frame stores its own bindings plus the index of its parent frame.
//! A context points at one frame; lookups walk parent indices from that
//! frame outwards, so inner frames shadow outer ones.
//!
//! Frames are reference counted. Every context holds one reference to its
//! frame and every child frame holds one to its parent. When the count
//! drops to zero the frame's bindings are dropped and its slot is reused.

use crate::error::{EngineError, EngineResult};
use crate::value::Binding;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of a frame inside a [`ScopeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    /// Raw index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

struct Frame {
    vars: IndexMap<String, Binding>,
    parent: Option<ScopeId>,
    refs: AtomicUsize,
}

#[derive(Default)]
struct Slots {
    frames: Vec<Option<Frame>>,
    free: Vec<usize>,
}

/// Store of scope frames with slot reuse
pub struct ScopeArena {
    slots: RwLock<Slots>,
}

impl ScopeArena {
    /// Create an arena holding a single empty root frame
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                frames: vec![Some(Frame {
                    vars: IndexMap::new(),
                    parent: None,
                    refs: AtomicUsize::new(0),
                })],
                free: Vec::new(),
            }),
        }
    }

    /// The root frame
    #[must_use]
    pub const fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Push a child frame of `parent` holding `vars`.
    ///
    /// The new frame starts unreferenced; the caller is expected to
    /// [`retain`](Self::retain) it.
    pub fn push(&self, parent: ScopeId, vars: IndexMap<String, Binding>) -> ScopeId {
        self.retain(parent);
        let frame = Frame {
            vars,
            parent: Some(parent),
            refs: AtomicUsize::new(0),
        };
        let mut slots = self.slots.write();
        match slots.free.pop() {
            Some(index) => {
                slots.frames[index] = Some(frame);
                ScopeId(index)
            }
            None => {
                slots.frames.push(Some(frame));
                ScopeId(slots.frames.len() - 1)
            }
        }
    }

    /// Add a reference to `scope`
    pub fn retain(&self, scope: ScopeId) {
        if let Some(Some(frame)) = self.slots.read().frames.get(scope.0) {
            frame.refs.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Drop a reference to `scope`, freeing it and then its unreferenced
    /// ancestors. The root frame is never freed.
    pub fn release(&self, scope: ScopeId) {
        let mut freed = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current.take() {
            let last = match self.slots.read().frames.get(id.0) {
                Some(Some(frame)) => frame.refs.fetch_sub(1, Ordering::AcqRel) == 1,
                _ => false,
            };
            if !last || id == self.root() {
                continue;
            }
            let mut slots = self.slots.write();
            let Some(frame) = slots.frames.get_mut(id.0).and_then(Option::take) else {
                continue;
            };
            slots.free.push(id.0);
            current = frame.parent;
            freed.push(frame);
        }
        // bindings may hold resources; drop them outside the lock
        drop(freed);
    }

    /// Find the nearest binding of `name` starting at `scope`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeOverflow`] if the walk visits more than
    /// `limit` frames
    pub fn lookup(&self, scope: ScopeId, name: &str, limit: usize) -> EngineResult<Option<Binding>> {
        let slots = self.slots.read();
        let mut current = Some(scope);
        let mut visited = 0usize;

        while let Some(id) = current {
            visited += 1;
            if visited > limit {
                return Err(EngineError::ScopeOverflow { limit });
            }
            let Some(Some(frame)) = slots.frames.get(id.0) else {
                break;
            };
            if let Some(binding) = frame.vars.get(name) {
                return Ok(Some(binding.clone()));
            }
            current = frame.parent;
        }

        Ok(None)
    }

    /// Names visible from `scope`, innermost first, without duplicates
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeOverflow`] if the walk visits more than
    /// `limit` frames
    pub fn visible_names(&self, scope: ScopeId, limit: usize) -> EngineResult<Vec<String>> {
        let slots = self.slots.read();
        let mut names: Vec<String> = Vec::new();
        let mut current = Some(scope);
        let mut visited = 0usize;

        while let Some(id) = current {
            visited += 1;
            if visited > limit {
                return Err(EngineError::ScopeOverflow { limit });
            }
            let Some(Some(frame)) = slots.frames.get(id.0) else {
                break;
            };
            for name in frame.vars.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            current = frame.parent;
        }

        Ok(names)
    }

    /// Number of live frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().frames.iter().filter(|slot| slot.is_some()).count()
    }

    /// Arenas always hold the root frame
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> IndexMap<String, Binding> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Binding::Value(v.clone())))
            .collect()
    }

    #[test]
    fn test_lookup_walks_outwards() {
        let arena = ScopeArena::new();
        let outer = arena.push(arena.root(), vars(&[("a", json!(1)), ("b", json!(2))]));
        let inner = arena.push(outer, vars(&[("a", json!(10))]));

        let a = arena.lookup(inner, "a", 16).unwrap().unwrap();
        assert_eq!(a.to_value(), json!(10));
        let b = arena.lookup(inner, "b", 16).unwrap().unwrap();
        assert_eq!(b.to_value(), json!(2));
        assert!(arena.lookup(inner, "c", 16).unwrap().is_none());
    }

    #[test]
    fn test_lookup_outer_unaffected_by_inner() {
        let arena = ScopeArena::new();
        let outer = arena.push(arena.root(), vars(&[("a", json!(1))]));
        let _inner = arena.push(outer, vars(&[("a", json!(10))]));

        let a = arena.lookup(outer, "a", 16).unwrap().unwrap();
        assert_eq!(a.to_value(), json!(1));
    }

    #[test]
    fn test_lookup_cap() {
        let arena = ScopeArena::new();
        let mut scope = arena.root();
        for i in 0..10 {
            scope = arena.push(scope, vars(&[(&format!("v{}", i), json!(i))]));
        }

        assert!(arena.lookup(scope, "v9", 4).unwrap().is_some());
        let err = arena.lookup(scope, "missing", 4).unwrap_err();
        assert_eq!(err, EngineError::ScopeOverflow { limit: 4 });
    }

    #[test]
    fn test_visible_names_shadowing() {
        let arena = ScopeArena::new();
        let outer = arena.push(arena.root(), vars(&[("a", json!(1)), ("b", json!(2))]));
        let inner = arena.push(outer, vars(&[("a", json!(10)), ("c", json!(3))]));

        let names = arena.visible_names(inner, 16).unwrap();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_arena_len() {
        let arena = ScopeArena::new();
        assert_eq!(arena.len(), 1);
        arena.push(arena.root(), IndexMap::new());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_release_frees_chain_and_reuses_slots() {
        let arena = ScopeArena::new();
        let outer = arena.push(arena.root(), vars(&[("a", json!(1))]));
        arena.retain(outer);
        let inner = arena.push(outer, vars(&[("b", json!(2))]));
        arena.retain(inner);
        assert_eq!(arena.len(), 3);

        // outer is still held by its own reference
        arena.release(inner);
        assert_eq!(arena.len(), 2);
        assert!(arena.lookup(outer, "a", 16).unwrap().is_some());

        let reused = arena.push(outer, IndexMap::new());
        assert_eq!(reused, inner);

        arena.retain(reused);
        arena.release(reused);
        arena.release(outer);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_root_never_freed() {
        let arena = ScopeArena::new();
        arena.retain(arena.root());
        arena.release(arena.root());
        assert_eq!(arena.len(), 1);
        let child = arena.push(arena.root(), vars(&[("x", json!(1))]));
        assert!(arena.lookup(child, "x", 4).unwrap().is_some());
    }

    proptest::proptest! {
        #[test]
        fn prop_lookup_finds_nearest_binding(values in proptest::collection::vec(0i64..4, 1..12)) {
            // frame i binds "v" only when its value is zero, plus "k{i}" always
            let arena = ScopeArena::new();
            let mut scope = arena.root();
            for (i, value) in values.iter().enumerate() {
                let mut frame = vars(&[(format!("k{}", i).as_str(), json!(i))]);
                if *value == 0 {
                    frame.insert("v".to_string(), Binding::Value(json!(i)));
                }
                scope = arena.push(scope, frame);
            }

            let expected = values.iter().rposition(|value| *value == 0).map(|i| json!(i));
            let found = arena.lookup(scope, "v", 64).unwrap().map(|b| b.to_value());
            proptest::prop_assert_eq!(found, expected);

            let first = arena.lookup(scope, "k0", 64).unwrap().map(|b| b.to_value());
            proptest::prop_assert_eq!(first, Some(json!(0)));
        }
    }
}
