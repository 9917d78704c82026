//! §4.1: the lineage index. An ordered, nested log of entries keyed by
//! `Tock`, queryable by precise start or by innermost containing range.
//!
//! Implemented as a tree of `Rc` nodes ordered by `start` within each level
//! (a `BTreeMap` per node, which gives the "simple balanced tree" alternative
//! the spec explicitly allows in place of a splay-list overlay), plus a
//! single weak-pointer cache remembering the last queried node so repeated
//! lookups of the same `Tock` are O(1).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::tock::{Tock, TockRange};

/// Which indexing strategy backs the akasha. `Splay` enables the
/// last-queried-node cache more aggressively (a cache hit also re-roots the
/// search from the cached node's parent rather than always falling back to
/// the tree root); `Tree` always falls back to root on a cache miss. Both
/// give identical query results — this only changes which queries are O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkashaBackend {
    Tree,
    Splay,
}

struct Node<V> {
    range: Cell<TockRange>,
    value: RefCell<V>,
    parent: RefCell<Weak<Node<V>>>,
    children: RefCell<BTreeMap<Tock, Rc<Node<V>>>>,
}

impl<V> Node<V> {
    fn covers(&self, t: Tock) -> bool {
        self.range.get().contains(t)
    }
}

/// A handle to one entry in the akasha, returned from queries. Cloning is
/// cheap (`Rc` clone); it does not copy the stored value.
pub struct Entry<V>(Rc<Node<V>>);

impl<V> Clone for Entry<V> {
    fn clone(&self) -> Self {
        Entry(self.0.clone())
    }
}

impl<V: Clone> Entry<V> {
    #[must_use]
    pub fn range(&self) -> TockRange {
        self.0.range.get()
    }

    #[must_use]
    pub fn start(&self) -> Tock {
        self.0.range.get().beg
    }

    #[must_use]
    pub fn value(&self) -> V {
        self.0.value.borrow().clone()
    }

    pub fn set_value(&self, value: V) {
        *self.0.value.borrow_mut() = value;
    }

    /// Grow (never shrink) this entry's `end`. Used by tail-call splicing
    /// (§4.2) and by completing a provisional entry.
    pub fn set_end(&self, end: Tock) {
        let mut range = self.0.range.get();
        assert!(end.0 >= range.end.0, "akasha entries never shrink");
        range.end = end;
        self.0.range.set(range);
    }

    #[must_use]
    pub fn parent(&self) -> Option<Entry<V>> {
        self.0.parent.borrow().upgrade().map(Entry)
    }

    fn is_same_node(&self, other: &Entry<V>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

pub struct Akasha<V> {
    root: Rc<Node<V>>,
    backend: AkashaBackend,
    cache: RefCell<Weak<Node<V>>>,
}

impl<V: Clone> Akasha<V> {
    #[must_use]
    pub fn new(root_value: V, backend: AkashaBackend) -> Self {
        let root = Rc::new(Node {
            range: Cell::new(TockRange::new(Tock::ROOT, Tock::MAX)),
            value: RefCell::new(root_value),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(BTreeMap::new()),
        });
        Akasha {
            cache: RefCell::new(Rc::downgrade(&root)),
            root,
            backend,
        }
    }

    #[must_use]
    pub fn root(&self) -> Entry<V> {
        Entry(self.root.clone())
    }

    fn descend_from(start: &Rc<Node<V>>, t: Tock) -> Rc<Node<V>> {
        let mut current = start.clone();
        loop {
            let child = current
                .children
                .borrow()
                .range(..=t)
                .next_back()
                .map(|(_, c)| c.clone())
                .filter(|c| c.covers(t));
            match child {
                Some(c) => current = c,
                None => return current,
            }
        }
    }

    fn cached_start(&self) -> Rc<Node<V>> {
        self.cache
            .borrow()
            .upgrade()
            .unwrap_or_else(|| self.root.clone())
    }

    /// §4.1 `get_containing(t)`: the innermost entry whose range covers `t`.
    /// Always succeeds — the synthetic root covers `[0, MAX)`.
    #[must_use]
    pub fn get_containing(&self, t: Tock) -> Entry<V> {
        let start = match self.backend {
            AkashaBackend::Splay => {
                let cached = self.cached_start();
                if cached.covers(t) {
                    cached
                } else {
                    self.root.clone()
                }
            }
            AkashaBackend::Tree => self.root.clone(),
        };
        let found = Self::descend_from(&start, t);
        *self.cache.borrow_mut() = Rc::downgrade(&found);
        Entry(found)
    }

    /// §4.1 `has_precise(t)`.
    #[must_use]
    pub fn has_precise(&self, t: Tock) -> bool {
        let entry = self.get_containing(t);
        entry.start() == t
    }

    /// §4.1 `get_precise(t)`: asserts existence (programmer error per §7).
    #[must_use]
    pub fn get_precise(&self, t: Tock) -> Entry<V> {
        let entry = self.get_containing(t);
        assert!(
            entry.start() == t,
            "akasha: no precise entry at {t} (programmer error)"
        );
        entry
    }

    /// §4.1 `get_parent(t)`: the entry that contains but is not equal to the
    /// precise entry at `t`, or the containing entry if `t` is not itself a
    /// precise start.
    #[must_use]
    pub fn get_parent(&self, t: Tock) -> Entry<V> {
        let containing = self.get_containing(t);
        if containing.start() == t {
            containing
                .parent()
                .expect("non-root precise entry always has a parent")
        } else {
            containing
        }
    }

    /// §4.1 `put(range, value)`: insert, reparenting any dominated siblings
    /// under the new entry. Asserts dominance and start-uniqueness
    /// (programmer errors per §7).
    pub fn put(&self, range: TockRange, value: V) -> Entry<V> {
        assert!(
            !self.has_precise(range.beg),
            "akasha: start {} already present",
            range.beg
        );
        let parent = self.get_containing(range.beg).0;
        assert!(
            parent.range.get().dominates(range),
            "akasha: {range} is not dominated by containing entry {}",
            parent.range.get()
        );

        let new_node = Rc::new(Node {
            range: Cell::new(range),
            value: RefCell::new(value),
            parent: RefCell::new(Rc::downgrade(&parent)),
            children: RefCell::new(BTreeMap::new()),
        });

        let reparented: Vec<(Tock, Rc<Node<V>>)> = {
            let mut parent_children = parent.children.borrow_mut();
            let keys: Vec<Tock> = parent_children
                .range(range.beg..range.end)
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| parent_children.remove(&k).map(|c| (k, c)))
                .collect()
        };
        for (k, child) in reparented {
            assert!(
                range.dominates(child.range.get()),
                "akasha: sibling {} does not nest under new entry {range} (crossing ranges)",
                child.range.get()
            );
            *child.parent.borrow_mut() = Rc::downgrade(&new_node);
            new_node.children.borrow_mut().insert(k, child);
        }

        parent.children.borrow_mut().insert(range.beg, new_node.clone());
        *self.cache.borrow_mut() = Rc::downgrade(&new_node);
        Entry(new_node)
    }

    /// §4.1 `remove_precise(t)`: delete, promoting children up one level.
    pub fn remove_precise(&self, t: Tock) -> V {
        assert!(t != Tock::ROOT, "akasha: the root context is never removed");
        let node = self.get_precise(t).0;
        let parent = node
            .parent
            .borrow()
            .upgrade()
            .expect("non-root entry always has a parent");

        let children = std::mem::take(&mut *node.children.borrow_mut());
        for (k, child) in children {
            *child.parent.borrow_mut() = Rc::downgrade(&parent);
            parent.children.borrow_mut().insert(k, child);
        }
        parent.children.borrow_mut().remove(&t);

        {
            let mut cache = self.cache.borrow_mut();
            if cache.upgrade().is_some_and(|c| Rc::ptr_eq(&c, &node)) {
                *cache = Rc::downgrade(&parent);
            }
        }

        Rc::try_unwrap(node)
            .map(|n| n.value.into_inner())
            .unwrap_or_else(|n| n.value.borrow().clone())
    }

    /// §4.1 `filter_children(t, pred)`: drop direct children of the entry at
    /// `t` matching `pred`, discarding their whole subtree.
    pub fn filter_children(&self, t: Tock, mut pred: impl FnMut(&V) -> bool) {
        let node = self.get_containing(t).0;
        let doomed: Vec<Tock> = node
            .children
            .borrow()
            .iter()
            .filter(|(_, c)| pred(&c.value.borrow()))
            .map(|(k, _)| *k)
            .collect();
        let mut children = node.children.borrow_mut();
        for k in doomed {
            children.remove(&k);
        }
    }

    /// Check the dominance/non-crossing invariant across the whole tree.
    /// Intended for tests and debug assertions, not the hot path.
    #[must_use]
    pub fn check_invariant(&self) -> bool {
        fn walk<V>(node: &Rc<Node<V>>) -> bool {
            let range = node.range.get();
            let children = node.children.borrow();
            let mut prev_end: Option<Tock> = None;
            for (start, child) in children.iter() {
                let child_range = child.range.get();
                if *start != child_range.beg {
                    return false;
                }
                if !range.dominates(child_range) {
                    return false;
                }
                if let Some(prev_end) = prev_end {
                    if child_range.beg.0 < prev_end.0 {
                        return false;
                    }
                }
                prev_end = Some(child_range.end);
                if !walk(child) {
                    return false;
                }
            }
            true
        }
        walk(&self.root)
    }
}

impl<V> PartialEq for Entry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_node(other)
    }
}
