//! §2/§4.2/§9: the engine (`Trailokya`) — the explicit, independently
//! constructible container for the clock, akasha, eviction heap and
//! replay-control state, plus the algorithms (`play`, `replay`,
//! `bind_zombie`) that drive them.
//!
//! **Single-output simplification.** The public bind API (§6) only ever
//! returns one `Zombie<R>` per call, so this crate lets a `Full` context's
//! own akasha key double as its sole produced value's `created_time` —
//! `start ≤ created_time` (§3) holds with equality. That collapses the
//! need for a `find_produced` search on the hot path and means replaying a
//! context's payload never has to synthesize a new `Tock`: it reuses
//! whichever node is already sitting in `produced()[0]`. Nested nested-bind
//! output tocks still have to come out identical across replay (so already-
//! resolved `Zombie` handles elsewhere in the log stay valid), which is why
//! `bind_core` still rewinds `current_tock` and checks `akasha.has_precise`
//! before allocating a fresh one — see `replay_context` below. This is
//! recorded as a deliberate adaptation in the grounding ledger, not a gap.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, trace, warn};

use crate::akasha::Akasha;
use crate::cell::Zombie;
use crate::clock::{SystemClock, ZombieClock};
use crate::config::{CostMetric, ZombieConfig};
use crate::context::{ContextNode, MwState, ReplayThunk, ValueNode};
use crate::error::ConfigError;
use crate::eviction::{ApproxFactor, GdHeap};
use crate::meter::Meter;
use crate::size::ZombieSize;
use crate::tock::{Tock, TockRange};
use crate::trampoline::Trampoline;

/// A type-erased computed value paired with a caller-supplied size, used by
/// [`crate::cell::bind_zombie_untyped`] where no concrete `R: ZombieSize`
/// exists at the call site to derive one from.
pub struct DynResult(pub Box<dyn Any>, pub usize);

impl ZombieSize for DynResult {
    fn zombie_size(&self) -> usize {
        self.1
    }
}

/// The container (`Trailokya`, §2/§9). One independent instance per test or
/// application; never a process-wide singleton.
pub struct Engine {
    pub(crate) config: ZombieConfig,
    #[allow(dead_code)]
    clock: Rc<dyn ZombieClock>,
    meter: Meter,
    current_tock: Cell<Tock>,
    akasha: Akasha<Rc<ContextNode>>,
    root: Rc<ContextNode>,
    book: GdHeap,
    /// Reverse dependency edges: a dependency's output `Tock` to the list of
    /// dependent contexts' own (= their single output's) `Tock`s. Needed for
    /// the `used_by` half of §4.3's union-find neighbor search, since the
    /// akasha only lets us walk from a context to its inputs, not back out
    /// to its dependents.
    dependents: RefCell<HashMap<Tock, Vec<Tock>>>,
    recompute_count: Cell<u64>,
    recompute_time: Cell<i64>,
    each_step: RefCell<Option<Box<dyn FnMut(TockRange)>>>,
}

impl Engine {
    pub fn new(config: ZombieConfig) -> Result<Rc<Engine>, ConfigError> {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(config: ZombieConfig, clock: Rc<dyn ZombieClock>) -> Result<Rc<Engine>, ConfigError> {
        config.validate()?;
        let root = ContextNode::root();
        let akasha = Akasha::new(root.clone(), config.akasha_backend);
        let meter = Meter::new(clock.clone());
        let book = GdHeap::new(ApproxFactor::new(config.approx_factor.0, config.approx_factor.1));
        Ok(Rc::new(Engine {
            config,
            clock,
            meter,
            current_tock: Cell::new(Tock::FIRST),
            akasha,
            root,
            book,
            dependents: RefCell::new(HashMap::new()),
            recompute_count: Cell::new(0),
            recompute_time: Cell::new(0),
            each_step: RefCell::new(None),
        }))
    }

    fn fresh_tock(&self) -> Tock {
        let t = self.current_tock.get();
        self.current_tock.set(t.next());
        t
    }

    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count.get()
    }

    #[must_use]
    pub fn recompute_time(&self) -> i64 {
        self.recompute_time.get()
    }

    #[must_use]
    pub fn reaper_score(&self) -> (usize, i64) {
        self.book.score()
    }

    #[must_use]
    pub fn have_soul(&self) -> bool {
        self.book.have_soul()
    }

    /// §10.4/§9's `each_step` hook: invoked once per bind execution (fresh
    /// or replayed), fresh or tail-called, with the just-closed context's
    /// provisional range.
    pub fn set_each_step(&self, hook: impl FnMut(TockRange) + 'static) {
        *self.each_step.borrow_mut() = Some(Box::new(hook));
    }

    /// §4.4's `murder()`: one reaping step. Returns `true` if a context was
    /// evicted, `false` if the heap was already empty.
    pub fn murder(self: &Rc<Self>) -> bool {
        let engine = self.clone();
        let victim = self.book.adjust_pop(move |ctx| engine.compute_cost(ctx));
        match victim {
            Some(ctx) => {
                self.evict_context(&ctx);
                true
            }
            None => false,
        }
    }

    // ---- cell construction -------------------------------------------------

    /// A user-provided leaf (§3: `Root` context). Always materialized,
    /// never evicted.
    pub(crate) fn new_root_value<T: ZombieSize + 'static>(self: &Rc<Self>, value: T) -> Tock {
        let t = self.fresh_tock();
        let size = value.zombie_size();
        let node = ValueNode::new(t, Box::new(value), size, &self.root);
        self.root.push_produced(node);
        t
    }

    /// §4.2 `bind_zombie`/§4.7: run (or replay-hit-reuse) one bind. Shared by
    /// every fixed-arity `bind1..bind4` wrapper and by
    /// `bind_zombie_untyped`, which only differ in how they downcast their
    /// typed inputs before calling into this.
    pub(crate) fn bind_core<R: ZombieSize + 'static>(
        self: &Rc<Self>,
        input_nodes: Vec<Rc<ValueNode>>,
        body: impl Fn(&[Rc<ValueNode>]) -> Trampoline<R> + 'static,
    ) -> Zombie<R> {
        let start_candidate = self.current_tock.get();

        if self.akasha.has_precise(start_candidate) {
            // We are inside a replay rewind (see `replay_context`) and this
            // exact nested bind already ran once. Reuse its context instead
            // of re-running the body — §4.2's replay-hit fast path.
            let entry = self.akasha.get_precise(start_candidate);
            let ctx = entry.value();
            trace!(tock = %start_candidate, "replay-hit: reusing nested context");
            let node = self.ensure_materialized(&ctx, entry.range());
            self.current_tock.set(entry.range().end);
            return Zombie::from_node(self, node);
        }

        let dependencies: Vec<Tock> = input_nodes.iter().map(|n| n.created_time).collect();
        debug!(inputs = dependencies.len(), "bind_zombie: fresh execution");

        let start = self.fresh_tock();
        let placeholder: Box<ReplayThunk> = Box::new(|_, _| Trampoline::Return(Tock::MAX));
        let ctx = ContextNode::full(dependencies, placeholder, 0);
        ctx.push_produced(ValueNode::empty(start, &ctx));
        let owner_weak: Weak<ContextNode> = Rc::downgrade(&ctx);
        let body_rc = Rc::new(body);
        let real_thunk: Box<ReplayThunk> = Box::new(move |engine: &Rc<Engine>, inputs: &[Rc<ValueNode>]| -> Trampoline<Tock> {
            let initial = (body_rc)(inputs);
            erase(engine.clone(), owner_weak.clone(), initial)
        });
        *ctx.full().expect("just constructed as Full").thunk.borrow_mut() = real_thunk;

        let engine_rc = self.clone();
        let ctx_for_step = ctx.clone();
        let each_step = &self.each_step;
        let (final_tock, elapsed_ns) = self.meter.measured(|| {
            let trampoline = {
                let mut thunk_ref = ctx.full().expect("Full").thunk.borrow_mut();
                (thunk_ref)(&engine_rc, &input_nodes)
            };
            trampoline.run(|| {
                ctx_for_step.full().expect("Full").state.set(MwState::TailCall);
                if let Some(hook) = each_step.borrow_mut().as_mut() {
                    hook(TockRange::open(start));
                }
            })
        });

        let elapsed = elapsed_ns as i64;
        let full = ctx.full().expect("Full");
        full.state.set(MwState::Complete);
        full.time_taken.set(elapsed);
        full.uf.set_initial_cost(elapsed);
        full.last_accessed.set(start.0 as i64);

        let end = self.current_tock.get();
        self.akasha.put(TockRange::new(start, end), ctx.clone());
        self.register_dependents(&ctx);
        let cost = self.compute_cost(&ctx);
        self.book.push(&ctx, cost);

        self.recompute_count.set(self.recompute_count.get() + 1);
        self.recompute_time.set(self.recompute_time.get() + elapsed);
        trace!(tock = %final_tock, range = %TockRange::new(start, end), "bind_zombie: installed");

        Zombie::from_tock(self, final_tock)
    }

    fn register_dependents(&self, ctx: &Rc<ContextNode>) {
        let full = ctx.full().expect("Full");
        let Some(own_tock) = ctx.produced().first().map(|n| n.created_time) else {
            return;
        };
        for dep in &full.dependencies {
            self.dependents.borrow_mut().entry(*dep).or_default().push(own_tock);
        }
    }

    // ---- resolution / replay ------------------------------------------------

    /// §4.7 `shared_ptr()`: resolve a cell's `Tock` to a materialized value
    /// node, replaying if its owning context evicted the payload.
    pub(crate) fn resolve_value(self: &Rc<Self>, tock: Tock) -> Rc<ValueNode> {
        if tock.is_sentinel() {
            error!("attempted to resolve a partial (unfilled) cell");
            panic!("zombie: attempted to resolve a partial (unfilled) cell");
        }
        let entry = self.akasha.get_containing(tock);
        let ctx = entry.value();
        if ctx.is_root() {
            return ctx
                .find_produced(tock)
                .expect("root-owned value always present: roots are never evicted");
        }
        self.ensure_materialized(&ctx, entry.range())
    }

    /// The context that owns the value produced at `tock`, without forcing
    /// a replay. Used by [`crate::cell::Zombie::evict`]/`evictable`.
    pub(crate) fn context_for(&self, tock: Tock) -> Rc<ContextNode> {
        self.akasha.get_containing(tock).value()
    }

    /// `true` iff the value at `tock` is currently materialised, without
    /// forcing a replay to find out.
    pub(crate) fn peek_materialized(&self, tock: Tock) -> bool {
        let ctx = self.context_for(tock);
        if ctx.is_root() {
            return true;
        }
        ctx.produced().first().is_some_and(|n| n.is_materialised())
    }

    fn ensure_materialized(self: &Rc<Self>, ctx: &Rc<ContextNode>, range: TockRange) -> Rc<ValueNode> {
        if let Some(node) = ctx.produced().first().cloned() {
            if node.is_materialised() {
                ctx.full().expect("non-root").last_accessed.set(self.current_tock.get().0 as i64);
                self.book.touch(ctx);
                return node;
            }
        }
        self.replay_context(ctx, range)
    }

    /// §4.2 `replay(ctx)` (ANF variant). Rewinds the clock to `ctx`'s own
    /// start so any nested binds it (re-)invokes are handed the exact same
    /// sequence of tocks they received the first time, then re-runs the
    /// stored thunk and reinstalls its output into the existing value node.
    ///
    /// No `Tardis` forward-target short-circuit here (see `MwState`'s doc
    /// comment): `range.beg` is always exactly `ctx`'s own single output
    /// tock under this crate's single-output-per-context design, so running
    /// `ctx`'s thunk to completion is already the minimal amount of work —
    /// there is no larger enclosing replay to exit early out of.
    fn replay_context(self: &Rc<Self>, ctx: &Rc<ContextNode>, range: TockRange) -> Rc<ValueNode> {
        let saved_tock = self.current_tock.get();
        self.current_tock.set(range.beg.next());

        let engine_rc = self.clone();
        let (_, elapsed_ns) = self.meter.measured(|| {
            let full = ctx.full().expect("replay target is always Full");
            let input_nodes: Vec<Rc<ValueNode>> = full.dependencies.iter().map(|t| self.resolve_value(*t)).collect();
            let trampoline = {
                let mut thunk_ref = full.thunk.borrow_mut();
                (thunk_ref)(&engine_rc, &input_nodes)
            };
            let ctx_for_step = ctx.clone();
            let each_step = &self.each_step;
            trampoline.run(|| {
                ctx_for_step.full().expect("Full").state.set(MwState::TailCall);
                if let Some(hook) = each_step.borrow_mut().as_mut() {
                    hook(TockRange::open(range.beg));
                }
            });
        });

        self.current_tock.set(saved_tock);

        let elapsed = elapsed_ns as i64;
        let full = ctx.full().expect("Full");
        full.state.set(MwState::Complete);
        full.time_taken.set(elapsed);
        full.evicted.set(false);
        full.uf.detach_with_cost(elapsed);
        full.last_accessed.set(saved_tock.0 as i64);

        let cost = self.compute_cost(ctx);
        self.book.push(ctx, cost);
        self.recompute_count.set(self.recompute_count.get() + 1);
        self.recompute_time.set(self.recompute_time.get() + elapsed);

        ctx.produced().first().cloned().expect("replay always reinstalls its single output")
    }

    // ---- eviction / cost ----------------------------------------------------

    fn compute_cost(&self, ctx: &Rc<ContextNode>) -> i64 {
        let full = ctx.full().expect("cost only defined for Full contexts");
        let space = ctx.produced_space().max(1) as i64;
        match self.config.metric {
            CostMetric::Local => full.time_taken.get() / space,
            CostMetric::Uf => {
                let neighbor_time = self.cost_of_set(ctx);
                let (num, den) = self.config.approx_factor;
                (neighbor_time * num as i64) / (den as i64 * space)
            }
        }
    }

    /// §4.3 `cost_of_set(ctx)`.
    fn cost_of_set(&self, ctx: &Rc<ContextNode>) -> i64 {
        let full = ctx.full().expect("Full");
        if full.evicted.get() {
            return full.uf.class_cost();
        }
        let mut total = full.time_taken.get();
        let mut seen_roots = Vec::new();
        self.for_each_evicted_neighbor(ctx, |neighbor_full| {
            let root_ptr = neighbor_full.uf.find_root_ptr();
            if !seen_roots.contains(&root_ptr) {
                seen_roots.push(root_ptr);
                total += neighbor_full.uf.class_cost();
            }
        });
        total
    }

    /// Visit every currently-evicted neighbor of `ctx` — contexts it depends
    /// on, and contexts that depend on it (§4.3's "input-Tock and each
    /// used_by-Tock").
    fn for_each_evicted_neighbor(&self, ctx: &Rc<ContextNode>, mut f: impl FnMut(&crate::context::FullData)) {
        let full = ctx.full().expect("Full");
        for dep in &full.dependencies {
            let neighbor = self.akasha.get_containing(*dep).value();
            if let Some(nfull) = neighbor.full() {
                if nfull.evicted.get() {
                    f(nfull);
                }
            }
        }
        if let Some(own_tock) = ctx.produced().first().map(|n| n.created_time) {
            if let Some(dependent_tocks) = self.dependents.borrow().get(&own_tock) {
                for dep_tock in dependent_tocks {
                    if self.akasha.has_precise(*dep_tock) {
                        let neighbor = self.akasha.get_precise(*dep_tock).value();
                        if let Some(nfull) = neighbor.full() {
                            if nfull.evicted.get() {
                                f(nfull);
                            }
                        }
                    }
                }
            }
        }
    }

    /// §4.3/§4.7: evict one context's materialized payload, merging its
    /// union-find class with any already-evicted neighbor.
    pub(crate) fn evict_context(&self, ctx: &Rc<ContextNode>) {
        let Some(full) = ctx.full() else {
            warn!("attempted to evict the root context; ignored");
            return;
        };
        if full.evicted.get() {
            return;
        }
        full.uf.set_initial_cost(full.time_taken.get());
        full.evicted.set(true);
        self.book.remove(ctx);
        for node in ctx.produced() {
            node.evict_payload();
        }

        let mut to_merge = Vec::new();
        self.for_each_evicted_neighbor(ctx, |nfull| to_merge.push(nfull.uf.clone()));
        for neighbor_uf in &to_merge {
            full.uf.merge(neighbor_uf);
        }

        info!(
            cost = full.uf.class_cost(),
            heap_size = self.book.len(),
            "evicted context"
        );
    }
}

/// Converts a typed `Trampoline<R>` into the type-erased `Trampoline<Tock>`
/// the replay thunk must return, installing (or reinstalling) the context's
/// sole produced value node on `Return` and preserving tail-call chaining
/// otherwise.
fn erase<R: ZombieSize + 'static>(engine: Rc<Engine>, owner: Weak<ContextNode>, t: Trampoline<R>) -> Trampoline<Tock> {
    match t {
        Trampoline::Return(value) => {
            let owner_ctx = owner.upgrade().expect("owning context alive while its thunk runs");
            let size = value.zombie_size();
            let slot = owner_ctx
                .produced()
                .first()
                .cloned()
                .expect("bind_core pre-allocates the output slot before running the body");
            slot.install_payload(Box::new(value));
            slot.set_size(size);
            Trampoline::Return(slot.created_time)
        }
        Trampoline::TailCall(next) => {
            let engine2 = engine.clone();
            let owner2 = owner.clone();
            Trampoline::TailCall(Box::new(move || erase(engine2, owner2, next())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn fresh_engine() -> Rc<Engine> {
        Engine::with_clock(ZombieConfig::default(), Rc::new(TestClock::new())).unwrap()
    }

    #[test]
    fn root_value_round_trips() {
        let engine = fresh_engine();
        let tock = engine.new_root_value(41i64);
        let node = engine.resolve_value(tock);
        assert_eq!(node.downcast_clone::<i64>(), Some(41));
    }

    #[test]
    fn bind_core_installs_a_complete_context() {
        let engine = fresh_engine();
        let x_tock = engine.new_root_value(1i64);
        let x_node = engine.resolve_value(x_tock);
        let z = engine.bind_core::<i64>(vec![x_node], |inputs| {
            let x = inputs[0].downcast_clone::<i64>().unwrap();
            Trampoline::Return(x * 2)
        });
        assert_eq!(z.get_value(), 2);
    }

    #[test]
    fn evicted_context_replays_to_the_same_value() {
        let engine = fresh_engine();
        let x_tock = engine.new_root_value(21i64);
        let x_node = engine.resolve_value(x_tock);
        let y = engine.bind_core::<i64>(vec![x_node], |inputs| {
            let x = inputs[0].downcast_clone::<i64>().unwrap();
            Trampoline::Return(x * 2)
        });
        assert_eq!(y.get_value(), 42);
        y.evict();
        assert_eq!(y.get_value(), 42);
    }

    /// §8 scenario 4: four binds chained with `time_taken` 10s, 11s, 12s,
    /// 14s; once all are evicted, `cost_of_set` of any one is 47s. Extended
    /// per the grounding ledger's resolution of the chapter's first open
    /// question to a second evict/replay/evict cycle, to show the middle
    /// node's cost stays conservative across repeated replay.
    #[test]
    fn uf_aggregation_of_costs_over_an_evicted_chain() {
        use crate::cell::EZombie;
        use crate::clock::TestClock;
        let clock = Rc::new(TestClock::new());
        let engine = Engine::with_clock(ZombieConfig::default(), clock.clone()).unwrap();

        let root_tock = engine.new_root_value(0i64);
        let root_node = engine.resolve_value(root_tock);

        let secs = |n: u64| n * 1_000_000_000;
        let make_link = |engine: &Rc<Engine>, input: Rc<ValueNode>, elapsed_ns: u64, clock: Rc<TestClock>| {
            engine.bind_core::<i64>(vec![input], move |inputs| {
                clock.fast_forward(elapsed_ns);
                let x = inputs[0].downcast_clone::<i64>().unwrap();
                Trampoline::Return(x + 1)
            })
        };

        let n1 = make_link(&engine, root_node, secs(10), clock.clone());
        let n2 = make_link(&engine, n1.value_node(), secs(11), clock.clone());
        let n3 = make_link(&engine, n2.value_node(), secs(12), clock.clone());
        let n4 = make_link(&engine, n3.value_node(), secs(14), clock.clone());

        let ctx1 = engine.context_for(n1.value_node().created_time);
        let ctx2 = engine.context_for(n2.value_node().created_time);
        let ctx3 = engine.context_for(n3.value_node().created_time);
        let ctx4 = engine.context_for(n4.value_node().created_time);

        for ctx in [&ctx1, &ctx2, &ctx3, &ctx4] {
            engine.evict_context(ctx);
        }

        assert_eq!(engine.cost_of_set(&ctx1), secs(47) as i64);
        assert_eq!(engine.cost_of_set(&ctx4), secs(47) as i64);

        // Replaying the middle node un-evicts it and subtracts its own
        // 11s from the remaining class's root, per the subtract-on-replay
        // rule (§9). The rule does not split a merged class back apart, so
        // the remaining {n1, n3, n4} class keeps n2's former transitive
        // contribution minus n2 itself: 47 - 11 = 36, not a re-partition
        // into disjoint chains either side of n2.
        assert_eq!(n2.get_value(), 2);
        assert_eq!(engine.cost_of_set(&ctx1), secs(36) as i64);

        // Evicting it again re-merges it with whichever evicted neighbor it
        // still touches; the aggregate must not have grown past the
        // original total.
        n2.evict();
        assert!(engine.cost_of_set(&ctx1) <= secs(47) as i64);
    }
}
