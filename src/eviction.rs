//! §4.4: the GreedyDual eviction heap. Priority is `stored_cost + L`, where
//! `L` is the priority of the most recently popped element; `adjust_pop`
//! tolerates stale stored costs within `approx_factor` before trusting a
//! freshly recomputed one.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::context::ContextNode;

/// A rational `> 1` tolerance band for `adjust_pop`. Equality is checked by
/// cross-multiplication so no division (and its rounding) is needed.
#[derive(Debug, Clone, Copy)]
pub struct ApproxFactor {
    pub num: u64,
    pub den: u64,
}

impl ApproxFactor {
    #[must_use]
    pub fn new(num: u64, den: u64) -> Self {
        assert!(num > den && den > 0, "approx_factor must satisfy num > den > 0");
        ApproxFactor { num, den }
    }

    /// `true` iff `new_cost` is still within `[stored/factor, stored*factor]`
    /// of `stored_cost`, i.e. the stale key can still be trusted.
    #[must_use]
    fn within_tolerance(self, stored_cost: i64, new_cost: i64) -> bool {
        let (num, den) = (i128::from(self.num), i128::from(self.den));
        let stored = i128::from(stored_cost);
        let new = i128::from(new_cost);
        // stored/num <= new/den  <=>  stored*den <= new*num
        let lower_ok = stored * den <= new * num;
        // new/num <= stored/den  <=>  new*den <= stored*num
        let upper_ok = new * den <= stored * num;
        lower_ok && upper_ok
    }
}

struct HeapNode {
    ctx: Weak<ContextNode>,
    stored_cost: i64,
    l_at_push: i64,
    seq: u64,
}

impl HeapNode {
    fn priority(&self) -> i64 {
        self.stored_cost + self.l_at_push
    }
}

/// The `book` heap (§2). Holds weak references so a context dropped by other
/// means (e.g. its whole akasha subtree pruned) simply disappears from the
/// heap on next pop rather than needing explicit bookkeeping.
pub struct GdHeap {
    nodes: RefCell<Vec<HeapNode>>,
    l: Cell<i64>,
    approx: ApproxFactor,
    next_seq: Cell<u64>,
}

impl GdHeap {
    #[must_use]
    pub fn new(approx: ApproxFactor) -> Self {
        GdHeap {
            nodes: RefCell::new(Vec::new()),
            l: Cell::new(0),
            approx,
            next_seq: Cell::new(0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    #[must_use]
    pub fn have_soul(&self) -> bool {
        !self.is_empty()
    }

    /// Diagnostic snapshot: current heap size and current `L`.
    #[must_use]
    pub fn score(&self) -> (usize, i64) {
        (self.len(), self.l.get())
    }

    fn less(a: &HeapNode, b: &HeapNode) -> bool {
        (a.priority(), a.seq) < (b.priority(), b.seq)
    }

    fn notify_index(&self, nodes: &[HeapNode], idx: usize) {
        if let Some(ctx) = nodes[idx].ctx.upgrade() {
            if let Some(full) = ctx.full() {
                full.pool_index.set(idx as i64);
            }
        }
    }

    fn sift_up(&self, nodes: &mut Vec<HeapNode>, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if Self::less(&nodes[idx], &nodes[parent]) {
                nodes.swap(idx, parent);
                self.notify_index(nodes, idx);
                self.notify_index(nodes, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&self, nodes: &mut Vec<HeapNode>, mut idx: usize) {
        let len = nodes.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && Self::less(&nodes[left], &nodes[smallest]) {
                smallest = left;
            }
            if right < len && Self::less(&nodes[right], &nodes[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            nodes.swap(idx, smallest);
            self.notify_index(nodes, idx);
            self.notify_index(nodes, smallest);
            idx = smallest;
        }
    }

    /// §4.4 `push(item, cost)`.
    pub fn push(&self, ctx: &Rc<ContextNode>, cost: i64) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len();
        nodes.push(HeapNode {
            ctx: Rc::downgrade(ctx),
            stored_cost: cost,
            l_at_push: self.l.get(),
            seq,
        });
        self.notify_index(&nodes, idx);
        self.sift_up(&mut nodes, idx);
    }

    /// §4.4 `touch(idx)`: reset the entry's `L_at_push` to the current `L`
    /// and rebalance — the "recent access" bump that keeps it from looking
    /// artificially cheap to evict.
    pub fn touch(&self, ctx: &Rc<ContextNode>) {
        let Some(full) = ctx.full() else { return };
        let idx = full.pool_index.get();
        if idx < 0 {
            return;
        }
        let idx = idx as usize;
        let mut nodes = self.nodes.borrow_mut();
        if idx >= nodes.len() {
            return;
        }
        nodes[idx].l_at_push = self.l.get();
        self.sift_down(&mut nodes, idx);
        self.sift_up(&mut nodes, idx);
    }

    /// Remove a specific context from the heap directly (used when a cell
    /// is evicted without going through the reaper).
    pub fn remove(&self, ctx: &Rc<ContextNode>) {
        let Some(full) = ctx.full() else { return };
        let idx = full.pool_index.get();
        if idx < 0 {
            return;
        }
        let idx = idx as usize;
        let mut nodes = self.nodes.borrow_mut();
        if idx >= nodes.len() {
            return;
        }
        full.pool_index.set(-1);
        let last = nodes.len() - 1;
        nodes.swap(idx, last);
        nodes.pop();
        if idx < nodes.len() {
            self.notify_index(&nodes, idx);
            self.sift_down(&mut nodes, idx);
            self.sift_up(&mut nodes, idx);
        }
    }

    /// §4.4 `adjust_pop(recompute_cost)`: repeatedly pop the min; if the
    /// popped cost is outside `[1/factor, factor]` of its freshly recomputed
    /// cost, push it back with the updated cost; else set `L` and return it.
    pub fn adjust_pop(&self, mut recompute_cost: impl FnMut(&Rc<ContextNode>) -> i64) -> Option<Rc<ContextNode>> {
        loop {
            let popped = {
                let mut nodes = self.nodes.borrow_mut();
                if nodes.is_empty() {
                    return None;
                }
                let last = nodes.len() - 1;
                nodes.swap(0, last);
                let popped = nodes.pop().expect("heap non-empty");
                if let Some(ctx) = popped.ctx.upgrade() {
                    if let Some(full) = ctx.full() {
                        full.pool_index.set(-1);
                    }
                }
                if !nodes.is_empty() {
                    self.notify_index(&nodes, 0);
                    self.sift_down(&mut nodes, 0);
                }
                popped
            };

            let Some(ctx) = popped.ctx.upgrade() else {
                // Stale entry for a context that no longer exists; skip it.
                continue;
            };

            let new_cost = recompute_cost(&ctx);
            if self.approx.within_tolerance(popped.stored_cost, new_cost) {
                self.l.set(popped.stored_cost + popped.l_at_push);
                return Some(ctx);
            }
            warn!(stored = popped.stored_cost, recomputed = new_cost, "stale eviction cost outside tolerance, pushed back");
            self.push(&ctx, new_cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextNode;
    use crate::tock::Tock;
    use crate::trampoline::Trampoline;

    fn fresh_full(time_taken: i64) -> Rc<ContextNode> {
        ContextNode::full(vec![], Box::new(move |_engine, _inputs| Trampoline::Return(Tock(1))), time_taken)
    }

    #[test]
    fn approx_factor_accepts_equal_cost() {
        let af = ApproxFactor::new(2, 1);
        assert!(af.within_tolerance(10, 10));
    }

    #[test]
    fn approx_factor_rejects_cost_outside_band() {
        let af = ApproxFactor::new(2, 1);
        assert!(!af.within_tolerance(10, 25));
        assert!(af.within_tolerance(10, 19));
    }

    #[test]
    fn push_and_pop_returns_minimum_cost() {
        let heap = GdHeap::new(ApproxFactor::new(2, 1));
        let a = fresh_full(5);
        let b = fresh_full(1);
        let c = fresh_full(3);
        heap.push(&a, 5);
        heap.push(&b, 1);
        heap.push(&c, 3);

        let popped = heap.adjust_pop(|ctx| ctx.full().unwrap().time_taken.get()).unwrap();
        assert!(Rc::ptr_eq(&popped, &b));
    }

    #[test]
    fn stale_cost_outside_tolerance_is_pushed_back_with_new_cost() {
        let heap = GdHeap::new(ApproxFactor::new(2, 1));
        let a = fresh_full(100);
        heap.push(&a, 1); // stored far too low
        let popped = heap.adjust_pop(|ctx| ctx.full().unwrap().time_taken.get()).unwrap();
        assert!(Rc::ptr_eq(&popped, &a));
    }

    #[test]
    fn touch_updates_priority_without_losing_membership() {
        let heap = GdHeap::new(ApproxFactor::new(2, 1));
        let a = fresh_full(1);
        let b = fresh_full(1);
        heap.push(&a, 10);
        heap.push(&b, 10);
        heap.touch(&a);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn remove_drops_membership() {
        let heap = GdHeap::new(ApproxFactor::new(2, 1));
        let a = fresh_full(1);
        heap.push(&a, 10);
        heap.remove(&a);
        assert_eq!(heap.len(), 0);
        assert_eq!(a.full().unwrap().pool_index.get(), -1);
    }
}
