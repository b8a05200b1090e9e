//! Doubly-linked list over a fixed array of slots.
//!
//! Every queue of the runtime (registered services, subject observers,
//! active jobs) is one of these lists. Nodes are addressed by [`NodeRef`],
//! which stays valid until the node is removed, so owners can keep a
//! reference to "their" entry and unlink it in O(1) from anywhere in the
//! list.

use core::fmt::Debug;

/// Reference to a node of a [`DlList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(u16);

impl NodeRef {
    /// Position of the node in the slot array.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    prev: Option<u16>,
    next: Option<u16>,
}

/// An ordered list with O(1) insertion and removal at the head, the tail and
/// next to any node, backed by `N` statically allocated slots.
#[derive(Debug, Clone)]
pub struct DlList<T, const N: usize> {
    slots: [Slot<T>; N],
    head: Option<u16>,
    tail: Option<u16>,
    free: Option<u16>,
    len: usize,
}

impl<T, const N: usize> Default for DlList<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> DlList<T, N> {
    const CAPACITY_OK: () = assert!(N <= u16::MAX as usize);

    /// Creates an empty list.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;
        Self {
            slots: core::array::from_fn(|i| Slot {
                value: None,
                prev: None,
                next: if i + 1 < N { Some(i as u16 + 1) } else { None },
            }),
            head: None,
            tail: None,
            free: if N > 0 { Some(0) } else { None },
            len: 0,
        }
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every slot is in use.
    pub fn is_full(&self) -> bool {
        self.free.is_none()
    }

    /// Maximum number of nodes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// First node.
    pub fn front(&self) -> Option<NodeRef> {
        self.head.map(NodeRef)
    }

    /// Last node.
    pub fn back(&self) -> Option<NodeRef> {
        self.tail.map(NodeRef)
    }

    /// Node following `node`, if `node` is linked and not the last one.
    pub fn next(&self, node: NodeRef) -> Option<NodeRef> {
        self.live(node)?.next.map(NodeRef)
    }

    /// Node preceding `node`, if `node` is linked and not the first one.
    pub fn prev(&self, node: NodeRef) -> Option<NodeRef> {
        self.live(node)?.prev.map(NodeRef)
    }

    /// Whether `node` currently refers to a linked node.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.live(node).is_some()
    }

    /// Value stored in `node`.
    pub fn get(&self, node: NodeRef) -> Option<&T> {
        self.live(node)?.value.as_ref()
    }

    /// Mutable value stored in `node`.
    pub fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        self.slots.get_mut(node.index())?.value.as_mut()
    }

    /// Appends `value` at the tail.
    ///
    /// # Errors
    /// Hands `value` back if the list is full.
    pub fn push_back(&mut self, value: T) -> Result<NodeRef, T> {
        let idx = self.alloc(value)?;
        self.link(idx, self.tail, None);
        Ok(NodeRef(idx))
    }

    /// Prepends `value` at the head.
    ///
    /// # Errors
    /// Hands `value` back if the list is full.
    pub fn push_front(&mut self, value: T) -> Result<NodeRef, T> {
        let idx = self.alloc(value)?;
        self.link(idx, None, self.head);
        Ok(NodeRef(idx))
    }

    /// Inserts `value` directly in front of `at`.
    ///
    /// # Errors
    /// Hands `value` back if the list is full or `at` is not linked.
    pub fn insert_before(&mut self, at: NodeRef, value: T) -> Result<NodeRef, T> {
        let Some(prev) = self.live(at).map(|s| s.prev) else {
            return Err(value);
        };
        let idx = self.alloc(value)?;
        self.link(idx, prev, Some(at.0));
        Ok(NodeRef(idx))
    }

    /// Inserts `value` directly behind `at`.
    ///
    /// # Errors
    /// Hands `value` back if the list is full or `at` is not linked.
    pub fn insert_after(&mut self, at: NodeRef, value: T) -> Result<NodeRef, T> {
        let Some(next) = self.live(at).map(|s| s.next) else {
            return Err(value);
        };
        let idx = self.alloc(value)?;
        self.link(idx, Some(at.0), next);
        Ok(NodeRef(idx))
    }

    /// Unlinks `node` and returns its value.
    pub fn remove(&mut self, node: NodeRef) -> Option<T> {
        let (prev, next) = self.live(node).map(|s| (s.prev, s.next))?;
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        let slot = &mut self.slots[node.index()];
        slot.prev = None;
        slot.next = self.free;
        self.free = Some(node.0);
        slot.value.take()
    }

    /// Unlinks the first node and returns its value.
    pub fn pop_front(&mut self) -> Option<T> {
        self.front().and_then(|n| self.remove(n))
    }

    /// First node whose value matches `pred`.
    pub fn find<F: FnMut(&T) -> bool>(&self, mut pred: F) -> Option<NodeRef> {
        self.iter().find(|(_, v)| pred(v)).map(|(n, _)| n)
    }

    /// Removes every node whose value does not match `keep`, preserving the
    /// order of the remaining nodes.
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, mut keep: F) {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            cursor = self.slots[idx as usize].next;
            let drop = match &self.slots[idx as usize].value {
                Some(v) => !keep(v),
                None => false,
            };
            if drop {
                _ = self.remove(NodeRef(idx));
            }
        }
    }

    /// Iterates over the nodes from head to tail.
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn live(&self, node: NodeRef) -> Option<&Slot<T>> {
        self.slots.get(node.index()).filter(|s| s.value.is_some())
    }

    fn alloc(&mut self, value: T) -> Result<u16, T> {
        let Some(idx) = self.free else {
            return Err(value);
        };
        let slot = &mut self.slots[idx as usize];
        self.free = slot.next;
        slot.value = Some(value);
        Ok(idx)
    }

    fn link(&mut self, idx: u16, prev: Option<u16>, next: Option<u16>) {
        let slot = &mut self.slots[idx as usize];
        slot.prev = prev;
        slot.next = next;
        match prev {
            Some(p) => self.slots[p as usize].next = Some(idx),
            None => self.head = Some(idx),
        }
        match next {
            Some(n) => self.slots[n as usize].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.len += 1;
    }
}

/// Iterator over the nodes of a [`DlList`].
#[derive(Debug)]
pub struct Iter<'a, T, const N: usize> {
    list: &'a DlList<T, N>,
    cursor: Option<u16>,
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = (NodeRef, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let slot = &self.list.slots[idx as usize];
        self.cursor = slot.next;
        slot.value.as_ref().map(|v| (NodeRef(idx), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<const N: usize>(list: &DlList<u8, N>) -> heapless::Vec<u8, N> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn insert_at_both_ends_and_interior() {
        let mut list = DlList::<u8, 8>::new();
        let b = list.push_back(2).unwrap();
        _ = list.push_front(1).unwrap();
        let d = list.push_back(4).unwrap();
        _ = list.insert_after(b, 3).unwrap();
        _ = list.insert_before(d, 35).unwrap();
        assert_eq!(values(&list).as_slice(), &[1, 2, 3, 35, 4]);
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(list.back().unwrap()), Some(&4));
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut list = DlList::<u8, 4>::new();
        let a = list.push_back(1).unwrap();
        let b = list.push_back(2).unwrap();
        let c = list.push_back(3).unwrap();
        assert_eq!(list.remove(b), Some(2));
        assert_eq!(list.next(a), Some(c));
        assert_eq!(list.prev(c), Some(a));
        assert_eq!(list.remove(a), Some(1));
        assert_eq!(list.front(), Some(c));
        assert_eq!(list.remove(c), Some(3));
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
    }

    #[test]
    fn stale_reference_is_rejected() {
        let mut list = DlList::<u8, 2>::new();
        let a = list.push_back(1).unwrap();
        assert_eq!(list.remove(a), Some(1));
        assert_eq!(list.remove(a), None);
        assert_eq!(list.get(a), None);
        assert_eq!(list.insert_before(a, 9), Err(9));
    }

    #[test]
    fn full_list_hands_value_back_and_slots_are_reused() {
        let mut list = DlList::<u8, 2>::new();
        let a = list.push_back(1).unwrap();
        _ = list.push_back(2).unwrap();
        assert!(list.is_full());
        assert_eq!(list.push_front(3), Err(3));
        _ = list.remove(a);
        _ = list.push_front(3).unwrap();
        assert_eq!(values(&list).as_slice(), &[3, 2]);
    }

    #[test]
    fn retain_keeps_order() {
        let mut list = DlList::<u8, 8>::new();
        for v in 1..=6 {
            _ = list.push_back(v).unwrap();
        }
        list.retain(|v| v % 2 == 0);
        assert_eq!(values(&list).as_slice(), &[2, 4, 6]);
        assert_eq!(list.find(|v| *v == 4).and_then(|n| list.get(n)), Some(&4));
        assert_eq!(list.pop_front(), Some(2));
    }
}
