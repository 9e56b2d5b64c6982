use core::iter::FusedIterator;

use crate::{Link, Links, TreeNode, WavlTree};

/// An in-order iterator over the elements of a [`WavlTree`].
///
/// Iteration starts from the tree's cached minimum and maximum and steps between in-order
/// neighbors, so a full traversal takes _O(n)_ time.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree WavlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree WavlTree<T>) -> Self {
        Iter {
            tree,

            front: tree.first,
            back: tree.last,
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.len -= 1;

        // SAFETY: `cur` is an element of the borrowed tree.
        unsafe {
            self.front = self.tree.successor_raw(cur);
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.len -= 1;

        // SAFETY: `cur` is an element of the borrowed tree.
        unsafe {
            self.back = self.tree.predecessor_raw(cur);
            Some(cur.as_ref())
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'tree, T> {}
