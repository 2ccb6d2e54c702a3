//! Per-user issuance history.
//!
//! A [`UserHistory`] is a doubly linked chain of [`HistoryNode`]s kept in a
//! slot arena. Links are [`NodeId`] handles into the arena rather than
//! owning pointers, so unlinking a node from either end can never leave a
//! traversal pointing into freed memory. Appends go on the `newest` end in
//! O(1) and expiry pops from the `oldest` end in O(k) for k removed nodes.

use crate::record::IssuanceRecord;

/// A broken link found by [`UserHistory::check_links`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Both end handles are unset on a non-empty history.
    #[error("no end nodes but len is {len}")]
    MissingEnds {
        /// Recorded length.
        len: usize,
    },

    /// Only one of `oldest` and `newest` is set.
    #[error("exactly one end node is set")]
    HalfOpen,

    /// End handles are set on an empty history.
    #[error("end nodes set on an empty history")]
    EndsOnEmpty,

    /// The older chain runs past `len` nodes.
    #[error("older chain is longer than len")]
    Cycle,

    /// A handle points at a free slot.
    #[error("dangling handle {0:?}")]
    Dangling(NodeId),

    /// A node's `newer` link does not point back at its successor.
    #[error("node {0:?} has a mismatched newer link")]
    Unreciprocated(NodeId),

    /// A node was created after the node linked as newer than it.
    #[error("node {0:?} is newer than its successor")]
    OutOfOrder(NodeId),

    /// The older chain length differs from `len`.
    #[error("older chain has {steps} nodes, len is {len}")]
    LengthMismatch {
        /// Nodes reached from `newest`.
        steps: usize,
        /// Recorded length.
        len: usize,
    },

    /// The older chain stops somewhere other than `oldest`.
    #[error("older chain does not end at oldest")]
    WrongOldest,

    /// Walking `newer` links from `oldest` gives a different length.
    #[error("newer chain length differs from len")]
    NewerLength,
}

/// Stable handle to a node inside one [`UserHistory`].
///
/// Handles are only meaningful for the history that issued them and are
/// recycled once the node is expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A record plus its navigation links.
#[derive(Debug, Clone)]
pub struct HistoryNode {
    record: IssuanceRecord,
    older: Option<NodeId>,
    newer: Option<NodeId>,
}

impl HistoryNode {
    /// The issuance record held by this node.
    #[must_use]
    pub fn record(&self) -> &IssuanceRecord {
        &self.record
    }

    /// Handle of the next older node, if any.
    #[must_use]
    pub fn older(&self) -> Option<NodeId> {
        self.older
    }

    /// Handle of the next newer node, if any.
    #[must_use]
    pub fn newer(&self) -> Option<NodeId> {
        self.newer
    }
}

/// Issuance history for a single user, ordered by arrival.
#[derive(Debug, Clone, Default)]
pub struct UserHistory {
    slots: Vec<Option<HistoryNode>>,
    free: Vec<usize>,
    oldest: Option<NodeId>,
    newest: Option<NodeId>,
    len: usize,
}

impl UserHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history by appending records in the given (oldest-first) order.
    pub fn from_records(records: impl IntoIterator<Item = IssuanceRecord>) -> Self {
        let mut history = Self::new();
        for record in records {
            history.append(record);
        }
        history
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the history holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of the oldest node.
    #[must_use]
    pub fn oldest(&self) -> Option<NodeId> {
        self.oldest
    }

    /// Handle of the newest node.
    #[must_use]
    pub fn newest(&self) -> Option<NodeId> {
        self.newest
    }

    /// Look up a node by handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&HistoryNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut HistoryNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Link a record in as the new newest node.
    pub fn append(&mut self, record: IssuanceRecord) -> NodeId {
        let previous = self.newest;
        let id = self.allocate(HistoryNode {
            record,
            older: previous,
            newer: None,
        });
        if let Some(prev) = previous
            && let Some(node) = self.node_mut(prev)
        {
            node.newer = Some(id);
        }
        self.newest = Some(id);
        if self.oldest.is_none() {
            self.oldest = Some(id);
        }
        self.len = self.len.saturating_add(1);
        id
    }

    /// Remove every record created strictly before `cutoff`.
    ///
    /// Walks from the oldest end and stops at the first record that is not
    /// expired. Records are appended in non-decreasing time order, so nothing
    /// past that point can be expired. Returns the number of records removed.
    pub fn expire_older_than(&mut self, cutoff: u64) -> usize {
        let mut removed: usize = 0;
        while let Some(id) = self.oldest {
            let Some(node) = self.node(id) else {
                break;
            };
            if node.record.create_time >= cutoff {
                break;
            }
            let newer = node.newer;
            self.release(id);
            self.oldest = newer;
            match newer {
                Some(next) => {
                    if let Some(next_node) = self.node_mut(next) {
                        next_node.older = None;
                    }
                },
                None => self.newest = None,
            }
            removed = removed.saturating_add(1);
        }
        self.len = self.len.saturating_sub(removed);
        if self.len == 0 {
            // Nothing left to point into; drop the arena's capacity too.
            self.slots = Vec::new();
            self.free = Vec::new();
        }
        removed
    }

    /// Records from newest to oldest.
    #[must_use]
    pub fn iter_newest_first(&self) -> Walk<'_> {
        Walk {
            history: self,
            next: self.newest,
            remaining: self.len,
            direction: Direction::Older,
        }
    }

    /// Records from oldest to newest.
    #[must_use]
    pub fn iter_oldest_first(&self) -> Walk<'_> {
        Walk {
            history: self,
            next: self.oldest,
            remaining: self.len,
            direction: Direction::Newer,
        }
    }

    /// Verify the chain structure.
    ///
    /// Walking `older` links from `newest` must reach `oldest` in exactly
    /// `len - 1` steps (and the mirror for `newer`), each link must be
    /// reciprocated, the end nodes must have no outward link, and creation
    /// times must be non-decreasing from oldest to newest.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_links(&self) -> Result<(), ChainError> {
        match (self.oldest, self.newest) {
            (None, None) if self.len == 0 => return Ok(()),
            (None, None) => return Err(ChainError::MissingEnds { len: self.len }),
            (Some(_), None) | (None, Some(_)) => return Err(ChainError::HalfOpen),
            (Some(_), Some(_)) if self.len == 0 => return Err(ChainError::EndsOnEmpty),
            _ => {},
        }

        let mut steps: usize = 0;
        let mut cursor = self.newest;
        let mut last = None;
        let mut newer_time = u64::MAX;
        while let Some(id) = cursor {
            if steps >= self.len {
                return Err(ChainError::Cycle);
            }
            let node = self.node(id).ok_or(ChainError::Dangling(id))?;
            if node.newer != last {
                return Err(ChainError::Unreciprocated(id));
            }
            if node.record.create_time > newer_time {
                return Err(ChainError::OutOfOrder(id));
            }
            newer_time = node.record.create_time;
            last = Some(id);
            cursor = node.older;
            steps = steps.saturating_add(1);
        }
        if steps != self.len {
            return Err(ChainError::LengthMismatch {
                steps,
                len: self.len,
            });
        }
        if last != self.oldest {
            return Err(ChainError::WrongOldest);
        }
        if self.iter_oldest_first().count() != self.len {
            return Err(ChainError::NewerLength);
        }
        Ok(())
    }

    fn allocate(&mut self, node: HistoryNode) -> NodeId {
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index)
        {
            *slot = Some(node);
            return NodeId(index);
        }
        let index = self.slots.len();
        self.slots.push(Some(node));
        NodeId(index)
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.0)
            && slot.take().is_some()
        {
            self.free.push(id.0);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Older,
    Newer,
}

/// Iterator over a history in one direction.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    history: &'a UserHistory,
    next: Option<NodeId>,
    remaining: usize,
    direction: Direction,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a IssuanceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.history.node(self.next?)?;
        self.next = match self.direction {
            Direction::Older => node.older,
            Direction::Newer => node.newer,
        };
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
