//! §3/§4.2: log entries (`Context`), the value nodes they own, and the
//! replay-control state (`MwState`) the engine drives them with.
//!
//! Deliberately data-only: the algorithms that build and replay a `Context`
//! (`play`, `replay`, `bind_zombie`) live in [`crate::engine`], the same
//! split the source keeps between `context.hpp` (data) and `zombie_impl.hpp`
//! / `trailokya.hpp` (algorithm + engine).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::cost::UfHandle;
use crate::tock::Tock;
use crate::trampoline::Trampoline;

/// `Full` context lifecycle state (§4.2).
///
/// The original design also has a `Partial` state — replay produced the
/// requested cell before running to completion, via the `Tardis` forward-
/// target mechanism. This crate's single-output-per-context design (see
/// `engine.rs`'s module doc) makes `Partial` unreachable: every
/// `resolve_value(tock)` call already lands on the exact context whose own
/// output equals `tock` (eviction clears a context's payload but never
/// removes its akasha entry, so there is never a larger enclosing context
/// to short-circuit out of). `Partial` is omitted rather than kept as a
/// variant nothing ever constructs; see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MwState {
    Complete,
    TailCall,
}

/// A type-erased holder for one computed value (`EZombieNode` in the
/// source). Owned strongly by exactly one `Context` (its producer); cells
/// hold only a weak reference.
pub struct ValueNode {
    pub created_time: Tock,
    payload: RefCell<Option<Box<dyn Any>>>,
    owner: RefCell<Weak<ContextNode>>,
    pool_index: Cell<i64>,
    size: Cell<usize>,
}

impl ValueNode {
    #[must_use]
    pub fn new(created_time: Tock, payload: Box<dyn Any>, size: usize, owner: &Rc<ContextNode>) -> Rc<Self> {
        Rc::new(ValueNode {
            created_time,
            payload: RefCell::new(Some(payload)),
            owner: RefCell::new(Rc::downgrade(owner)),
            pool_index: Cell::new(-1),
            size: Cell::new(size),
        })
    }

    /// An unmaterialised placeholder, reserved before a `Full` context's
    /// body has actually run. `bind_core` pre-allocates one of these at the
    /// context's own `start` tock so the produced value's `created_time`
    /// always equals `start`, regardless of how many nested binds the body
    /// runs (and how many tocks they consume) before it returns.
    #[must_use]
    pub fn empty(created_time: Tock, owner: &Rc<ContextNode>) -> Rc<Self> {
        Rc::new(ValueNode {
            created_time,
            payload: RefCell::new(None),
            owner: RefCell::new(Rc::downgrade(owner)),
            pool_index: Cell::new(-1),
            size: Cell::new(0),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn set_size(&self, size: usize) {
        self.size.set(size);
    }

    #[must_use]
    pub fn is_materialised(&self) -> bool {
        self.payload.borrow().is_some()
    }

    #[must_use]
    pub fn owner(&self) -> Option<Rc<ContextNode>> {
        self.owner.borrow().upgrade()
    }

    pub fn set_owner(&self, owner: &Rc<ContextNode>) {
        *self.owner.borrow_mut() = Rc::downgrade(owner);
    }

    #[must_use]
    pub fn pool_index(&self) -> i64 {
        self.pool_index.get()
    }

    pub fn set_pool_index(&self, idx: i64) {
        self.pool_index.set(idx);
    }

    /// Drop the materialised payload. The value node itself stays alive
    /// (cells may still hold weak references to it) but `downcast` now
    /// returns `None`.
    pub fn evict_payload(&self) {
        *self.payload.borrow_mut() = None;
    }

    pub fn install_payload(&self, payload: Box<dyn Any>) {
        *self.payload.borrow_mut() = Some(payload);
    }

    #[must_use]
    pub fn downcast_clone<T: Clone + 'static>(&self) -> Option<T> {
        self.payload.borrow().as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Like [`Self::downcast_clone`], but for payload types that are not
    /// `Clone` (e.g. [`crate::engine::DynResult`]): runs `f` against a
    /// borrowed reference instead of cloning out.
    #[must_use]
    pub fn with_payload<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.payload.borrow().as_ref()?.downcast_ref::<T>().map(f)
    }
}

/// A persistent, re-invocable replay thunk. Invoked with the engine and the
/// (already-summoned) input value nodes in dependency order; returns the
/// `Tock` of the produced cell, possibly via a tail-call trampoline.
///
/// Takes `&Rc<Engine>` rather than `&Engine` so a `TailCall` continuation
/// (which must be `'static`) can clone its own owned handle to the engine
/// out of the reference instead of borrowing across calls.
pub type ReplayThunk = dyn FnMut(&Rc<crate::engine::Engine>, &[Rc<ValueNode>]) -> Trampoline<Tock>;

/// Fields only meaningful on a `Full` context.
pub struct FullData {
    pub dependencies: Vec<Tock>,
    pub thunk: RefCell<Box<ReplayThunk>>,
    pub time_taken: Cell<i64>,
    pub last_accessed: Cell<i64>,
    pub pool_index: Cell<i64>,
    pub state: Cell<MwState>,
    pub uf: UfHandle,
    pub evicted: Cell<bool>,
}

pub enum ContextKind {
    /// User-provided leaf; never evicted, no replay thunk.
    Root,
    Full(FullData),
}

/// One log entry. Stored in the akasha as the generic payload; its `Tock`
/// range is tracked by the akasha node that owns it, not here.
pub struct ContextNode {
    pub kind: ContextKind,
    produced: RefCell<Vec<Rc<ValueNode>>>,
}

impl ContextNode {
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(ContextNode {
            kind: ContextKind::Root,
            produced: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn full(dependencies: Vec<Tock>, thunk: Box<ReplayThunk>, time_taken: i64) -> Rc<Self> {
        Rc::new(ContextNode {
            kind: ContextKind::Full(FullData {
                dependencies,
                thunk: RefCell::new(thunk),
                time_taken: Cell::new(time_taken),
                last_accessed: Cell::new(0),
                pool_index: Cell::new(-1),
                state: Cell::new(MwState::Complete),
                uf: UfHandle::new(time_taken),
                evicted: Cell::new(false),
            }),
            produced: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self.kind, ContextKind::Root)
    }

    #[must_use]
    pub fn full(&self) -> Option<&FullData> {
        match &self.kind {
            ContextKind::Full(data) => Some(data),
            ContextKind::Root => None,
        }
    }

    pub fn push_produced(&self, node: Rc<ValueNode>) {
        self.produced.borrow_mut().push(node);
    }

    #[must_use]
    pub fn produced(&self) -> Vec<Rc<ValueNode>> {
        self.produced.borrow().clone()
    }

    #[must_use]
    pub fn produced_space(&self) -> usize {
        self.produced.borrow().iter().map(|n| n.size()).sum()
    }

    #[must_use]
    pub fn find_produced(&self, t: Tock) -> Option<Rc<ValueNode>> {
        self.produced.borrow().iter().find(|n| n.created_time == t).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_node_payload_round_trips() {
        let root = ContextNode::root();
        let node = ValueNode::new(Tock(1), Box::new(42i64), 8, &root);
        assert_eq!(node.downcast_clone::<i64>(), Some(42));
        assert!(node.is_materialised());
        node.evict_payload();
        assert!(!node.is_materialised());
        assert_eq!(node.downcast_clone::<i64>(), None);
        node.install_payload(Box::new(42i64));
        assert!(node.is_materialised());
    }

    #[test]
    fn root_context_has_no_full_data() {
        let root = ContextNode::root();
        assert!(root.is_root());
        assert!(root.full().is_none());
    }
}
