//! An intrusive weak AVL tree, or WAVL tree, and an ordered map built on it.
#![no_std]

// Conventions used in comments are from Haeupler, Sen and Tarjan:
// - The rank of a node `x` is denoted `r(x)`. Missing children have rank -1.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if its left child is an `i`-child and its right child a `j`-child.
//
// The fundamental invariants of a WAVL tree are:
// 1. All rank differences are either 1 or 2.
// 2. All leaves have rank 0, i.e. there are no 2,2 leaves.
//
// Corollaries:
// 3. All ancestors of a leaf have rank at least one.
// 4. All unary nodes have rank 1, and their sole child is a leaf.
//
//    Proof:
//    a. A unary node `n` has one missing child of rank -1, so `r(n) ∈ {0, 1}` (by (1)).
//    b. The present child `c` has `r(c) ≥ 0` (by (2) and (3)), so `r(n) = 1` and `r(c) = 0`.
//    c. A rank 0 node with a child would have a rank difference of at most 0, so `c` is a leaf.
//    QED
//
// Rebalancing is driven by the pair of rank differences of a single node (see `RankDiffs`).
// Insertion may create 0-children, deletion may create 3-children and 2,2 leaves; each walk
// moves upward one node at a time and stops at the first legal node or after a rotation.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(any(all(test, feature = "std"), feature = "model"))]
extern crate std;

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod error;
mod iter;
#[cfg(feature = "alloc")]
mod map;
#[cfg(any(all(test, feature = "std"), feature = "model"))]
pub mod model;
mod rank;

pub use error::{Error, Result};
pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use map::WavlMap;

use rank::RankDiffs;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive weak AVL tree, or WAVL tree.
///
/// Implementation based on the paper [Rank-Balanced Trees] by Haeupler, Sen and Tarjan.
///
/// The tree keeps pointers to its minimum and maximum elements, which are maintained
/// incrementally by insertion and removal.
///
/// [Rank-Balanced Trees]: http://arks.princeton.edu/ark:/88435/pr1nz5z
pub struct WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    first: Link<T>,
    last: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

/// Which rebalancing walk a rotation belongs to.
///
/// Both walks demote the node rotated down. Rotations during removal must also absorb the rank
/// deficit left by a 3-child, so they additionally promote the node rotated up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Insert,
    Remove,
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    rank: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> WavlTree<T> {
        WavlTree {
            root: None,
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree, counted in edges from the root to the deepest leaf.
    ///
    /// Empty and single-element trees both have height 0.
    pub fn height(&self) -> usize {
        fn height_at<T: TreeNode<Links<T>> + ?Sized>(node: NonNull<T>) -> usize {
            let (left, right) = unsafe {
                let links = T::links(node).as_ref();
                (links.left(), links.right())
            };

            [left, right]
                .into_iter()
                .flatten()
                .map(|child| height_at(child) + 1)
                .max()
                .unwrap_or(0)
        }

        self.root.map(height_at).unwrap_or(0)
    }

    /// Returns an iterator over the elements of the tree in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let reachable = match self.root {
            Some(root) => unsafe {
                assert_eq!(T::links(root).as_ref().parent(), None, "root has a parent");
                self.assert_invariants_at(root)
            },
            None => 0,
        };

        assert_eq!(reachable, self.len, "length does not match reachable nodes");

        // Ensure the cached extremes are the actual extremes.
        unsafe {
            assert_eq!(
                self.first,
                self.root.map(|r| self.extreme_in_subtree(r, Dir::Left))
            );
            assert_eq!(
                self.last,
                self.root.map(|r| self.extreme_in_subtree(r, Dir::Right))
            );
        }

        // Ensure in-order traversal yields strictly ascending keys.
        let mut prev: Option<&T::Key> = None;
        let mut visited = 0;
        for item in self.iter() {
            if let Some(prev) = prev {
                assert!(
                    prev < item.key(),
                    "keys out of order: {prev:?} before {:?}",
                    item.key()
                );
            }

            prev = Some(item.key());
            visited += 1;
        }

        assert_eq!(visited, self.len);
    }

    // Checks the subtree rooted at `node`, returning its size.
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let rank = T::links(node).as_ref().rank();
            let mut size = 1;

            // Ensure all leaves have rank 0.
            if T::links(node).as_ref().is_leaf() {
                assert_eq!(rank, 0, "leaf {:?} has rank {rank}", node.as_ref().key());
            }

            // Ensure all rank differences are 1 or 2, counting missing children.
            let left = rank - self.rank(T::links(node).as_ref().left());
            let right = rank - self.rank(T::links(node).as_ref().right());
            assert!(
                RankDiffs::new(left, right).is_some_and(RankDiffs::is_legal),
                "node {:?} has rank differences ({left}, {right})",
                node.as_ref().key(),
            );

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = T::links(node).as_ref().child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = T::links(child)
                        .as_ref()
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let expected = match dir {
                        Dir::Left => Ordering::Less,
                        Dir::Right => Ordering::Greater,
                    };
                    assert_eq!(child.as_ref().key().cmp(node.as_ref().key()), expected);

                    size += self.assert_invariants_at(child);
                }
            }

            size
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the returned item are
    /// modified, as doing so may result in undefined behavior.
    pub unsafe fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns `true` if the tree contains an item with key `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = T::links(cur).as_ref().left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = T::links(cur).as_ref().right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => self.replace_child(parent, old_child, new_child),
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert!(
                new_child.is_none() || T::links(parent).as_ref().child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            T::links(parent).as_mut().set_child(dir, new_child);
        }
    }

    // Rotates `down` toward `dir`.
    //
    // The child of `down` on the `!dir` side takes its place and is returned; that child's `dir`
    // subtree crosses over to become the `!dir` child of `down`. `down` is demoted, and during
    // removal the risen node is also promoted.
    unsafe fn rotate(&mut self, down: NonNull<T>, dir: Dir, phase: Phase) -> NonNull<T> {
        unsafe {
            let up = T::links(down)
                .as_ref()
                .child(!dir)
                .expect("rotation requires a child to rotate up");

            let across = T::links(up).as_ref().child(dir);
            T::links(down).as_mut().set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            T::links(up).as_mut().set_child(dir, Some(down));
            let parent = T::links(down).as_mut().set_parent(Some(up));
            T::links(up).as_mut().set_parent(parent);
            self.replace_child_or_set_root(parent, down, Some(up));

            self.demote(down);
            if phase == Phase::Remove {
                self.promote(up);
            }

            let (down_key, up_key) = (down.as_ref().key(), up.as_ref().key());
            tracing::trace!(?down_key, ?up_key, ?dir, ?phase, "rotate");

            up
        }
    }

    // Rotates the `!dir` child of `down` toward `!dir`, then `down` toward `dir`.
    //
    // Returns the grandchild that ends up on top. On top of the adjustments made by the two
    // single rotations, that grandchild is promoted during insertion, and `down` is demoted once
    // more during removal.
    unsafe fn rotate_twice(&mut self, down: NonNull<T>, dir: Dir, phase: Phase) -> NonNull<T> {
        unsafe {
            let child = T::links(down)
                .as_ref()
                .child(!dir)
                .expect("double rotation requires a child");

            self.rotate(child, !dir, phase);
            let up = self.rotate(down, dir, phase);

            match phase {
                Phase::Insert => self.promote(up),
                Phase::Remove => self.demote(down),
            }

            up
        }
    }

    /// Inserts an item into the tree, returning the number of rebalancing operations performed.
    ///
    /// Each promotion counts as one operation, a single rotation as one and a double rotation as
    /// two. If the tree already contains an item with an equal key, the tree is not modified
    /// and `item` is handed back as the error.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<usize, T::Handle> {
        let ptr = T::into_ptr(item);
        unsafe { T::links(ptr).as_mut().clear() };

        let Some(root) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            self.root = Some(ptr);
            self.first = Some(ptr);
            self.last = Some(ptr);
            self.len += 1;
            return Ok(0);
        };

        let mut parent = root;

        // Descend the tree, looking for a vacant child slot.
        loop {
            let ordering = unsafe { ptr.as_ref().key().cmp(parent.as_ref().key()) };

            let dir = match ordering {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return Err(unsafe { T::from_ptr(ptr) }),
                Ordering::Greater => Dir::Right,
            };

            unsafe {
                match T::links(parent).as_ref().child(dir) {
                    // Descend.
                    Some(child) => parent = child,

                    // Set `item` as child.
                    None => {
                        T::links(parent).as_mut().set_child(dir, Some(ptr));
                        T::links(ptr).as_mut().set_parent(Some(parent));
                        break;
                    }
                }
            }
        }

        self.len += 1;

        unsafe {
            let key = ptr.as_ref().key();

            if self.first.map_or(true, |first| key < first.as_ref().key()) {
                self.first = Some(ptr);
            }

            if self.last.map_or(true, |last| key > last.as_ref().key()) {
                self.last = Some(ptr);
            }

            let ops = self.rebalance_after_insert(parent);
            tracing::debug!(?key, ops, len = self.len, "inserted");

            Ok(ops)
        }
    }

    // Performs a bottom-up rebalance of the tree after a leaf was attached below `start`.
    //
    // While the current node is 0,1 (or 1,0) it is promoted, which may make it a 0-child of its
    // own parent. A 0,2 node is fixed by a rotation, after which the rank rule holds.
    unsafe fn rebalance_after_insert(&mut self, start: NonNull<T>) -> usize {
        let mut ops = 0;

        // The side of the 0-child of the most recently promoted node.
        let mut promoted_heavy = None;
        let mut opt_node = Some(start);

        while let Some(node) = opt_node {
            let heavy = match self.rank_diffs(node) {
                RankDiffs::D0_1 => Dir::Left,
                RankDiffs::D1_0 => Dir::Right,

                RankDiffs::D0_2 => {
                    return ops + self.rotate_after_insert(node, Dir::Left, promoted_heavy);
                }
                RankDiffs::D2_0 => {
                    return ops + self.rotate_after_insert(node, Dir::Right, promoted_heavy);
                }

                RankDiffs::D1_1 | RankDiffs::D1_2 | RankDiffs::D2_1 | RankDiffs::D2_2 => {
                    return ops;
                }

                diffs @ (RankDiffs::D1_3 | RankDiffs::D3_1 | RankDiffs::D2_3 | RankDiffs::D3_2) => {
                    unreachable!("rank differences {diffs:?} after insertion")
                }
            };

            self.promote(node);
            ops += 1;
            promoted_heavy = Some(heavy);

            let (key, rank) = (node.as_ref().key(), T::links(node).as_ref().rank());
            tracing::trace!(?key, rank, "promote");

            opt_node = T::links(node).as_ref().parent();
        }

        ops
    }

    // Fixes the 0,2 node `node`, whose 0-child is on the `heavy` side.
    //
    // If that child was itself promoted for a 0-child on the same side, a single rotation
    // suffices; otherwise the child's inner child is rotated up twice.
    unsafe fn rotate_after_insert(
        &mut self,
        node: NonNull<T>,
        heavy: Dir,
        promoted_heavy: Option<Dir>,
    ) -> usize {
        unsafe {
            if promoted_heavy == Some(heavy) {
                self.rotate(node, !heavy, Phase::Insert);
                1
            } else {
                self.rotate_twice(node, !heavy, Phase::Insert);
                2
            }
        }
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    // Returns the node furthest toward `dir` in the subtree rooted at `root`.
    unsafe fn extreme_in_subtree(&self, root: NonNull<T>, dir: Dir) -> NonNull<T> {
        let mut cur = root;

        while let Some(child) = unsafe { T::links(cur).as_ref().child(dir) } {
            cur = child;
        }

        cur
    }

    // Returns the in-order neighbor of `node` in direction `dir`.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = T::links(node).as_ref().child(dir) {
                return Some(self.extreme_in_subtree(child, !dir));
            }

            // Ascend until arriving from the `!dir` side.
            let mut cur = node;
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if T::links(parent).as_ref().child(!dir) == Some(cur) {
                    return Some(parent);
                }

                cur = parent;
            }

            None
        }
    }

    #[inline]
    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    #[inline]
    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    /// Removes the item with key `key` from the tree.
    ///
    /// Returns the removed item along with the number of rebalancing operations performed, or
    /// `None` if no item has that key.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(T::Handle, usize)>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;

        // SAFETY: `node` was just found in `self`.
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first?;

        // SAFETY: the cached first node is an element of `self`.
        Some(unsafe { self.remove_at(first) }.0)
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last?;

        // SAFETY: the cached last node is an element of `self`.
        Some(unsafe { self.remove_at(last) }.0)
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// Returns the removed item along with the number of rebalancing operations performed.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> (T::Handle, usize) {
        // There are three possible cases:
        //
        // 1. `node` is a leaf.
        //
        //    It is unlinked. If its parent was unary, the parent becomes a 2,2 leaf; if it was a
        //    2-child, its parent gains a 3-child.
        //
        // 2. `node` has one child.
        //
        //    The child (always a leaf, by corollary 4) is elevated into `node`'s place. If `node`
        //    was a 2-child, the child becomes a 3-child.
        //
        // 3. `node` has two children.
        //
        //    `node`'s successor[^1] is removed from the tree and assumes `node`'s place and rank.
        //    The successor's right child is elevated to replace it. The successor's former parent
        //    may become a 2,2 leaf or gain a 3-child, or, if the successor was `node`'s right
        //    child, the successor itself may gain a 3-child on the right.
        //
        // In every case the rebalance starts at the one node whose rank rule may be violated.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            // The cached extremes must move before the links they are derived from change.
            if self.first == Some(node) {
                self.first = self.successor_raw(node);
            }

            if self.last == Some(node) {
                self.last = self.predecessor_raw(node);
            }

            let parent = T::links(node).as_ref().parent();
            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            let start = match (left, right) {
                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);
                    parent
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    T::links(child).as_mut().set_parent(parent);

                    // The elevated child is a 1,1 leaf; only its new parent may be violated.
                    parent
                }

                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);

                    if let Some(successor_parent) = successor_parent {
                        // Elevate the successor's right child to replace it.
                        let successor_right = T::links(successor).as_ref().right();
                        T::links(successor_parent)
                            .as_mut()
                            .set_left(successor_right);
                        self.maybe_set_parent(successor_right, Some(successor_parent));

                        T::links(successor).as_mut().set_right(Some(right));
                        T::links(right).as_mut().set_parent(Some(successor));
                    }

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    // Transfer rank of `node` to `successor`.
                    let node_rank = T::links(node).as_ref().rank();

                    let successor_links = T::links(successor).as_mut();
                    successor_links.set_parent(parent);
                    successor_links.set_rank(node_rank);
                    successor_links.set_left(Some(left));
                    // Right link is updated above iff succ != right.

                    T::links(left).as_mut().set_parent(Some(successor));

                    Some(successor_parent.unwrap_or(successor))
                }
            };

            T::links(node).as_mut().clear();
            self.len -= 1;

            let ops = self.rebalance_after_remove(start);
            tracing::debug!(ops, len = self.len, "removed");

            (T::from_ptr(node), ops)
        }
    }

    // Performs a bottom-up rebalance of the tree after a removal, starting at `start`.
    //
    // A 2,2 leaf is demoted first. Afterward, while the current node has a 3-child it is
    // demoted (if its other child is a 2-child) or it is demoted together with its 1-child (if
    // that child is 2,2), and the walk ascends; otherwise a rotation fixes the 3-child and the
    // walk stops.
    unsafe fn rebalance_after_remove(&mut self, start: Link<T>) -> usize {
        let Some(mut node) = start else {
            return 0;
        };

        let mut ops = 0;

        unsafe {
            if self.is_2_2_leaf(node) {
                self.demote(node);
                ops += 1;

                let key = node.as_ref().key();
                tracing::trace!(?key, "demote 2,2 leaf");

                node = match T::links(node).as_ref().parent() {
                    Some(parent) => parent,
                    None => return ops,
                };
            }

            loop {
                match self.rank_diffs(node) {
                    RankDiffs::D3_2 | RankDiffs::D2_3 => {
                        self.demote(node);
                        ops += 1;

                        let key = node.as_ref().key();
                        tracing::trace!(?key, "demote");
                    }

                    diffs @ (RankDiffs::D3_1 | RankDiffs::D1_3) => {
                        // The 1-child hangs on the `near` side.
                        let near = if diffs == RankDiffs::D3_1 {
                            Dir::Right
                        } else {
                            Dir::Left
                        };

                        let sibling = T::links(node)
                            .as_ref()
                            .child(near)
                            .expect("a 1-child of a node with a 3-child is never missing");

                        match self.rank_diffs(sibling) {
                            RankDiffs::D2_2 => {
                                self.demote(node);
                                self.demote(sibling);
                                ops += 2;

                                let key = node.as_ref().key();
                                tracing::trace!(?key, "double demote");
                            }

                            // The sibling's outer child is a 1-child.
                            sibling_diffs if sibling_diffs.get(near) == 1 => {
                                self.rotate(node, !near, Phase::Remove);

                                if self.is_2_2_leaf(node) {
                                    self.demote(node);
                                }

                                return ops + 1;
                            }

                            sibling_diffs => {
                                debug_assert_eq!(sibling_diffs.get(!near), 1);

                                self.rotate_twice(node, !near, Phase::Remove);
                                return ops + 2;
                            }
                        }
                    }

                    RankDiffs::D1_1 | RankDiffs::D1_2 | RankDiffs::D2_1 | RankDiffs::D2_2 => {
                        return ops;
                    }

                    diffs @ (RankDiffs::D0_1 | RankDiffs::D1_0 | RankDiffs::D0_2 | RankDiffs::D2_0) => {
                        unreachable!("rank differences {diffs:?} after removal")
                    }
                }

                node = match T::links(node).as_ref().parent() {
                    Some(parent) => parent,
                    None => return ops,
                };
            }
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| T::links(cur).as_ref().parent());

                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                T::links(cur).as_mut().clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.first = None;
        self.last = None;

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = T::links(node).as_mut().inner.get_mut();
            inner.rank = inner.rank.checked_add(1).expect("rank overflow");
        }
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = T::links(node).as_mut().inner.get_mut();
            inner.rank = inner.rank.checked_sub(1).expect("rank underflow");
        }
    }

    /// Returns the rank of the pointed-to node.
    unsafe fn rank(&self, node: Option<NonNull<T>>) -> i8 {
        node.map(|n| T::links(n).as_ref().rank()).unwrap_or(-1)
    }

    // Returns the rank differences of `node`.
    //
    // Panics if they are not a pair that can occur during rebalancing.
    unsafe fn rank_diffs(&self, node: NonNull<T>) -> RankDiffs {
        unsafe {
            let links = T::links(node).as_ref();
            let rank = links.rank();
            let left = rank - self.rank(links.left());
            let right = rank - self.rank(links.right());

            match RankDiffs::new(left, right) {
                Some(diffs) => diffs,
                None => unreachable!(
                    "node {:?} has rank differences ({left}, {right})",
                    node.as_ref().key()
                ),
            }
        }
    }

    unsafe fn is_2_2_leaf(&self, node: NonNull<T>) -> bool {
        unsafe {
            let links = T::links(node).as_ref();
            links.is_leaf() && links.rank() == 1
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if T::links(parent).as_ref().left() == Some(child) {
            Dir::Left
        } else {
            debug_assert_eq!(
                T::links(parent).as_ref().right(),
                Some(child),
                "`child` must be a child of `parent`"
            );
            Dir::Right
        }
    }
}

impl<T> Default for WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                rank: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn rank(&self) -> i8 {
        unsafe { (*self.inner.get()).rank }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_rank(&mut self, rank: i8) {
        self.inner.get_mut().rank = rank;
    }

    // Resets the links to those of a detached rank 0 node.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.rank = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("rank", &self.rank())
            .finish()
    }
}
