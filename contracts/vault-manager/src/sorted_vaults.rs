//! Sorted Vault List
//!
//! Doubly linked list of active vaults ordered by nominal ICR, highest at
//! the head. Each node stores the NICR it was inserted with.
//!
//! For a key `k` the only valid position is between `prev` and `next` with
//! `prev.nicr > k >= next.nicr`. Among equal keys the newest node therefore
//! sits closest to the head and the oldest closest to the tail.
//!
//! Callers pass `(prev, next)` hints; a stale or wrong hint only costs a
//! walk along the list, never a wrong position.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use moneyp_common::{
    errors::{MoneypError, MoneypResult},
    types::Address,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct Node {
    prev: Option<Address>,
    next: Option<Address>,
    nicr: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SortedVaults {
    nodes: BTreeMap<Address, Node>,
    head: Option<Address>,
    tail: Option<Address>,
    max_size: Option<u64>,
}

impl SortedVaults {
    pub fn new(max_size: Option<u64>) -> Self {
        Self { max_size, ..Self::default() }
    }

    // ============ Queries ============

    pub fn contains(&self, id: &Address) -> bool {
        self.nodes.contains_key(id)
    }

    /// Highest NICR
    pub fn first(&self) -> Option<Address> {
        self.head
    }

    /// Lowest NICR
    pub fn last(&self) -> Option<Address> {
        self.tail
    }

    /// Neighbour toward the tail
    pub fn next(&self, id: &Address) -> Option<Address> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    /// Neighbour toward the head
    pub fn prev(&self, id: &Address) -> Option<Address> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    /// Key the node was inserted with
    pub fn nicr_of(&self, id: &Address) -> Option<u128> {
        self.nodes.get(id).map(|n| n.nicr)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    pub fn is_full(&self) -> bool {
        self.max_size.is_some_and(|max| self.nodes.len() as u64 >= max)
    }

    /// Ids from head to tail
    pub fn iter(&self) -> SortedVaultsIter<'_> {
        SortedVaultsIter { list: self, cursor: self.head }
    }

    // ============ Positioning ============

    /// True if `nicr` belongs exactly between `prev` and `next`
    pub fn valid_insert_position(&self, nicr: u128, prev: Option<Address>, next: Option<Address>) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(next)) => {
                self.head == Some(next) && self.key(&next).is_some_and(|k| nicr >= k)
            }
            (Some(prev), None) => {
                self.tail == Some(prev) && self.key(&prev).is_some_and(|k| k > nicr)
            }
            (Some(prev), Some(next)) => {
                self.next(&prev) == Some(next)
                    && self.key(&prev).is_some_and(|k| k > nicr)
                    && self.key(&next).is_some_and(|k| nicr >= k)
            }
        }
    }

    /// Position for `nicr`, starting from the hints where they are usable
    pub fn find_insert_position(
        &self,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> (Option<Address>, Option<Address>) {
        // A hint is only a usable starting point if it sits on the right
        // side of `nicr`
        let prev = prev_hint.filter(|p| self.key(p).is_some_and(|k| k > nicr));
        let next = next_hint.filter(|n| self.key(n).is_some_and(|k| nicr >= k));

        match (prev, next) {
            (Some(prev), _) => self.descend_list(nicr, prev),
            (None, Some(next)) => self.ascend_list(nicr, next),
            (None, None) => match self.head {
                None => (None, None),
                Some(head) if self.key(&head).is_some_and(|k| nicr >= k) => (None, Some(head)),
                Some(head) => self.descend_list(nicr, head),
            },
        }
    }

    /// Walk toward the tail from a node whose key is above `nicr`
    fn descend_list(&self, nicr: u128, start: Address) -> (Option<Address>, Option<Address>) {
        let mut prev = start;
        loop {
            match self.next(&prev) {
                Some(next) if self.key(&next).is_some_and(|k| k > nicr) => prev = next,
                next => return (Some(prev), next),
            }
        }
    }

    /// Walk toward the head from a node whose key is at or below `nicr`
    fn ascend_list(&self, nicr: u128, start: Address) -> (Option<Address>, Option<Address>) {
        let mut next = start;
        loop {
            match self.prev(&next) {
                Some(prev) if self.key(&prev).is_some_and(|k| nicr >= k) => next = prev,
                prev => return (prev, Some(next)),
            }
        }
    }

    fn key(&self, id: &Address) -> Option<u128> {
        self.nicr_of(id)
    }

    // ============ Mutation ============

    pub fn insert(
        &mut self,
        id: Address,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> MoneypResult<()> {
        if let Some(max_size) = self.max_size {
            if self.nodes.len() as u64 >= max_size {
                return Err(MoneypError::ListFull { max_size: max_size as usize });
            }
        }
        if self.contains(&id) {
            return Err(MoneypError::DuplicateNode { id });
        }
        if nicr == 0 {
            return Err(MoneypError::InvalidNicr);
        }

        let (prev, next) = if self.valid_insert_position(nicr, prev_hint, next_hint) {
            (prev_hint, next_hint)
        } else {
            self.find_insert_position(nicr, prev_hint, next_hint)
        };

        self.nodes.insert(id, Node { prev, next, nicr });
        match prev {
            Some(p) => self.link_next(p, Some(id)),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.link_prev(n, Some(id)),
            None => self.tail = Some(id),
        }
        Ok(())
    }

    /// Unlink `id`; absent ids are ignored
    pub fn remove(&mut self, id: &Address) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        match node.prev {
            Some(p) => self.link_next(p, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.link_prev(n, node.prev),
            None => self.tail = node.prev,
        }
    }

    /// Move `id` to the position for `new_nicr`
    pub fn reinsert(
        &mut self,
        id: Address,
        new_nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
    ) -> MoneypResult<()> {
        if !self.contains(&id) {
            return Err(MoneypError::VaultNotActive { borrower: id });
        }
        if new_nicr == 0 {
            return Err(MoneypError::InvalidNicr);
        }
        self.remove(&id);
        self.insert(id, new_nicr, prev_hint, next_hint)
    }

    fn link_next(&mut self, id: Address, next: Option<Address>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.next = next;
        }
    }

    fn link_prev(&mut self, id: Address, prev: Option<Address>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.prev = prev;
        }
    }
}

/// Head-to-tail iterator over a [`SortedVaults`]
pub struct SortedVaultsIter<'a> {
    list: &'a SortedVaults,
    cursor: Option<Address>,
}

impl Iterator for SortedVaultsIter<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let current = self.cursor?;
        self.cursor = self.list.next(&current);
        Some(current)
    }
}
