//! §3/§6: `Zombie<T>`, the public handle to a (possibly evicted) computed
//! value, and the `bind_zombie` family that produces one.
//!
//! Mirrors the source's `EZombie` / `Zombie<T>` split: `EZombie` is the
//! type-erased base every cell implements (resolve to a [`ValueNode`]
//! without knowing `T`), `Zombie<T>` adds the typed `get_value`.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::context::ValueNode;
use crate::engine::{DynResult, Engine};
use crate::size::ZombieSize;
use crate::tock::Tock;
use crate::trampoline::Trampoline;

/// The type-erased base of every cell, so `bind_zombie_untyped` can accept a
/// heterogeneous list of inputs without knowing each one's `T`.
pub trait EZombie {
    fn value_node(&self) -> Rc<ValueNode>;
    fn engine_handle(&self) -> Rc<Engine>;
}

/// A handle to one (possibly evicted) computed value. Cheap to clone: it is
/// just an `Rc<Engine>` and a `Tock`, never the payload itself.
pub struct Zombie<T> {
    engine: Rc<Engine>,
    tock: Tock,
    _marker: PhantomData<T>,
}

impl<T> Clone for Zombie<T> {
    fn clone(&self) -> Self {
        Zombie {
            engine: self.engine.clone(),
            tock: self.tock,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> EZombie for Zombie<T> {
    fn value_node(&self) -> Rc<ValueNode> {
        self.engine.resolve_value(self.tock)
    }

    fn engine_handle(&self) -> Rc<Engine> {
        self.engine.clone()
    }
}

/// A `Zombie<T>`'s own size is just its handle's stack footprint — a `Tock`
/// and an `Rc` — never the (possibly evicted) payload it points at. Payload
/// size is charged to the owning context's `produced_space`, not here.
impl<T> ZombieSize for Zombie<T> {
    fn zombie_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

impl<T: ZombieSize + 'static> Zombie<T> {
    /// A user-provided leaf (§3 `Root` context). Always materialised, never
    /// evicted.
    #[must_use]
    pub fn new(engine: &Rc<Engine>, value: T) -> Self {
        let tock = engine.new_root_value(value);
        Zombie {
            engine: engine.clone(),
            tock,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Zombie<T> {
    #[must_use]
    pub(crate) fn from_tock(engine: &Rc<Engine>, tock: Tock) -> Self {
        Zombie {
            engine: engine.clone(),
            tock,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub(crate) fn from_node(engine: &Rc<Engine>, node: Rc<ValueNode>) -> Self {
        Self::from_tock(engine, node.created_time)
    }

    /// Resolve and clone the current value, replaying its lineage first if
    /// it was evicted.
    ///
    /// # Panics
    /// If the stored payload does not downcast to `T` — a programmer error
    /// (mixing up two `Zombie` handles), not a recoverable condition.
    #[must_use]
    pub fn get_value(&self) -> T
    where
        T: Clone,
    {
        self.value_node()
            .downcast_clone::<T>()
            .expect("zombie: stored payload type mismatch (programmer error)")
    }

    /// `true` iff the value is currently held in memory (no replay needed to
    /// read it right now). Always `true` for a root-leaf cell.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.engine.peek_materialized(self.tock)
    }

    /// `true` iff evicting this cell would do anything: it must be a
    /// non-root, currently-materialised context.
    #[must_use]
    pub fn evictable(&self) -> bool {
        let ctx = self.engine.context_for(self.tock);
        ctx.full().is_some_and(|full| !full.evicted.get()) && self.is_materialized()
    }

    /// Drop this cell's materialised payload, merging its recomputation cost
    /// with any already-evicted neighbor (§4.3/§4.7). A no-op on a root
    /// leaf or an already-evicted cell.
    pub fn evict(&self) {
        let ctx = self.engine.context_for(self.tock);
        self.engine.evict_context(&ctx);
    }
}

/// Build a tail-call step (§4.2/§9): hands the engine a continuation to run
/// again in the same trampoline loop instead of recursing.
pub fn tail_call<R>(next: impl FnOnce() -> Trampoline<R> + 'static) -> Trampoline<R> {
    Trampoline::TailCall(Box::new(next))
}

/// §6 `bind_zombie` (arity 1).
pub fn bind1<A, R>(a: &Zombie<A>, f: impl Fn(&A) -> Trampoline<R> + 'static) -> Zombie<R>
where
    A: Clone + 'static,
    R: ZombieSize + 'static,
{
    let engine = a.engine.clone();
    let node_a = a.value_node();
    engine.bind_core::<R>(vec![node_a], move |inputs| {
        let av = inputs[0]
            .downcast_clone::<A>()
            .expect("bind1: input type mismatch (programmer error)");
        f(&av)
    })
}

/// §6 `bind_zombie` (arity 2).
pub fn bind2<A, B, R>(a: &Zombie<A>, b: &Zombie<B>, f: impl Fn(&A, &B) -> Trampoline<R> + 'static) -> Zombie<R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: ZombieSize + 'static,
{
    let engine = a.engine.clone();
    let node_a = a.value_node();
    let node_b = b.value_node();
    engine.bind_core::<R>(vec![node_a, node_b], move |inputs| {
        let av = inputs[0]
            .downcast_clone::<A>()
            .expect("bind2: input 0 type mismatch (programmer error)");
        let bv = inputs[1]
            .downcast_clone::<B>()
            .expect("bind2: input 1 type mismatch (programmer error)");
        f(&av, &bv)
    })
}

/// §6 `bind_zombie` (arity 3).
pub fn bind3<A, B, C, R>(
    a: &Zombie<A>,
    b: &Zombie<B>,
    c: &Zombie<C>,
    f: impl Fn(&A, &B, &C) -> Trampoline<R> + 'static,
) -> Zombie<R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    R: ZombieSize + 'static,
{
    let engine = a.engine.clone();
    let node_a = a.value_node();
    let node_b = b.value_node();
    let node_c = c.value_node();
    engine.bind_core::<R>(vec![node_a, node_b, node_c], move |inputs| {
        let av = inputs[0]
            .downcast_clone::<A>()
            .expect("bind3: input 0 type mismatch (programmer error)");
        let bv = inputs[1]
            .downcast_clone::<B>()
            .expect("bind3: input 1 type mismatch (programmer error)");
        let cv = inputs[2]
            .downcast_clone::<C>()
            .expect("bind3: input 2 type mismatch (programmer error)");
        f(&av, &bv, &cv)
    })
}

/// §6 `bind_zombie` (arity 4).
pub fn bind4<A, B, C, D, R>(
    a: &Zombie<A>,
    b: &Zombie<B>,
    c: &Zombie<C>,
    d: &Zombie<D>,
    f: impl Fn(&A, &B, &C, &D) -> Trampoline<R> + 'static,
) -> Zombie<R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    D: Clone + 'static,
    R: ZombieSize + 'static,
{
    let engine = a.engine.clone();
    let node_a = a.value_node();
    let node_b = b.value_node();
    let node_c = c.value_node();
    let node_d = d.value_node();
    engine.bind_core::<R>(vec![node_a, node_b, node_c, node_d], move |inputs| {
        let av = inputs[0]
            .downcast_clone::<A>()
            .expect("bind4: input 0 type mismatch (programmer error)");
        let bv = inputs[1]
            .downcast_clone::<B>()
            .expect("bind4: input 1 type mismatch (programmer error)");
        let cv = inputs[2]
            .downcast_clone::<C>()
            .expect("bind4: input 2 type mismatch (programmer error)");
        let dv = inputs[3]
            .downcast_clone::<D>()
            .expect("bind4: input 3 type mismatch (programmer error)");
        f(&av, &bv, &cv, &dv)
    })
}

/// An arity-erased `bind_zombie` over a heterogeneous slice of inputs.
/// `Return`-only: unlike `bind1..bind4`, it does not thread a trampoline, since
/// an erased body has no concrete `R` to drive a `tail_call` through on its
/// own terms (the caller packs both the value and its size into `DynResult`
/// up front). Reach for the typed wrappers when a bind body needs to
/// self-recurse.
///
/// # Panics
/// If `inputs` is empty — at least one input is required to obtain an engine
/// handle.
pub fn bind_zombie_untyped(
    inputs: &[&dyn EZombie],
    f: impl Fn(&[Rc<ValueNode>]) -> DynResult + 'static,
) -> Zombie<DynResult> {
    assert!(!inputs.is_empty(), "bind_zombie_untyped: at least one input is required");
    let engine = inputs[0].engine_handle();
    let nodes: Vec<Rc<ValueNode>> = inputs.iter().map(|z| z.value_node()).collect();
    engine.bind_core::<DynResult>(nodes, move |ns| Trampoline::Return(f(ns)))
}
