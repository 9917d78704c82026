//! §4.3: union-find over evicted contexts. When a context is evicted it
//! merges with any already-evicted neighbor (input or dependent); the
//! aggregate recomputation cost of the resulting class is kept at the root.

use std::cell::RefCell;
use std::rc::Rc;

/// A single node of the union-find forest. `parent` is `None` iff this node
/// is currently a root; `cost` is only meaningful at the root.
struct UfNode {
    parent: Option<UfHandle>,
    cost: i64,
}

/// A reference-counted handle to one union-find node, so neighbors can share
/// the same class without the engine owning a central registry.
#[derive(Clone)]
pub struct UfHandle(Rc<RefCell<UfNode>>);

impl UfHandle {
    #[must_use]
    pub fn new(cost: i64) -> Self {
        UfHandle(Rc::new(RefCell::new(UfNode { parent: None, cost })))
    }

    /// Find the representative of this node's class, compressing the path
    /// as it goes (every traversal mutates `parent` toward the root, exactly
    /// as `UFNode::get_root` does in the source).
    #[must_use]
    pub fn find_root(&self) -> UfHandle {
        let next = {
            let node = self.0.borrow();
            match &node.parent {
                None => return self.clone(),
                Some(parent) => parent.clone(),
            }
        };
        let root = next.find_root();
        self.0.borrow_mut().parent = Some(root.clone());
        root
    }

    #[must_use]
    pub fn is_same_class(&self, other: &UfHandle) -> bool {
        Rc::ptr_eq(&self.find_root().0, &other.find_root().0)
    }

    /// Aggregate cost of this node's class (only correct on the root; callers
    /// should go through `find_root` first, which this does internally).
    #[must_use]
    pub fn class_cost(&self) -> i64 {
        self.find_root().0.borrow().cost
    }

    /// Merge `self`'s class with `other`'s class, address-ordering the
    /// surviving root the same way `UFNode::merge` picks a representative:
    /// an arbitrary but consistent rule (here, lower `Rc` address) so merges
    /// are commutative regardless of call order.
    pub fn merge(&self, other: &UfHandle) {
        let mut lhs = self.find_root();
        let mut rhs = other.find_root();
        if Rc::ptr_eq(&lhs.0, &rhs.0) {
            return;
        }
        let lhs_addr = Rc::as_ptr(&lhs.0) as usize;
        let rhs_addr = Rc::as_ptr(&rhs.0) as usize;
        if lhs_addr > rhs_addr {
            std::mem::swap(&mut lhs, &mut rhs);
        }
        let rhs_cost = rhs.0.borrow().cost;
        rhs.0.borrow_mut().parent = Some(lhs.clone());
        lhs.0.borrow_mut().cost += rhs_cost;
    }

    /// A stable identity for this node's current root, suitable for
    /// deduplicating neighbor lookups across a single cost computation.
    #[must_use]
    pub fn find_root_ptr(&self) -> usize {
        Rc::as_ptr(&self.find_root().0) as usize
    }

    /// Overwrite this node's cost in place. Only valid while it is still a
    /// singleton root (i.e. right after construction, before any merge) —
    /// used to backfill the real `time_taken` once a bind finishes running,
    /// since the union-find handle has to exist before that duration is known.
    pub fn set_initial_cost(&self, cost: i64) {
        let mut node = self.0.borrow_mut();
        debug_assert!(node.parent.is_none(), "set_initial_cost on a non-root node");
        node.cost = cost;
    }

    /// Detach this node from its class and reset it to a fresh singleton
    /// root with `cost`, subtracting its prior contribution from the old
    /// root. Used when a context is replayed (un-evicted): §4.3's "subtract
    /// its `time_taken` from the root's `set_cost` and reset its parent to
    /// itself."
    pub fn detach_with_cost(&self, cost: i64) {
        let root = self.find_root();
        if !Rc::ptr_eq(&root.0, &self.0) {
            root.0.borrow_mut().cost -= cost;
        }
        let mut node = self.0.borrow_mut();
        node.parent = None;
        node.cost = cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_class_cost_is_its_own() {
        let a = UfHandle::new(10);
        assert_eq!(a.class_cost(), 10);
    }

    #[test]
    fn merge_sums_costs_and_unifies_roots() {
        let a = UfHandle::new(10);
        let b = UfHandle::new(11);
        a.merge(&b);
        assert!(a.is_same_class(&b));
        assert_eq!(a.class_cost(), 21);
        assert_eq!(b.class_cost(), 21);
    }

    #[test]
    fn chain_merge_aggregates_all_members() {
        // UF aggregation of costs scenario (§8.4): four binds chained, costs
        // 10, 11, 12, 14 sum to 47 once fully merged.
        let a = UfHandle::new(10);
        let b = UfHandle::new(11);
        let c = UfHandle::new(12);
        let d = UfHandle::new(14);
        a.merge(&b);
        b.merge(&c);
        c.merge(&d);
        assert_eq!(a.class_cost(), 47);
        assert_eq!(d.class_cost(), 47);
        assert!(a.is_same_class(&d));
    }

    #[test]
    fn detach_subtracts_from_former_root_and_restores_singleton() {
        let a = UfHandle::new(10);
        let b = UfHandle::new(11);
        let c = UfHandle::new(12);
        let d = UfHandle::new(14);
        a.merge(&b);
        b.merge(&c);
        c.merge(&d);
        assert_eq!(a.class_cost(), 47);

        // Replaying the middle node detaches it and subtracts its share;
        // the remaining class keeps the rest (scenario 4: 47 -> 26 after
        // removing one 21-cost member... using this toy chain the exact
        // remainder depends on which node detaches; we assert only the
        // invariant that the detached node becomes a fresh singleton and
        // the old root's cost strictly decreases).
        let root_before = b.find_root().class_cost();
        b.detach_with_cost(11);
        assert_eq!(b.class_cost(), 11);
        assert!(!b.is_same_class(&a));
        let root_after = a.class_cost();
        assert!(root_after < root_before);
    }
}
