//! Client-side set algebra over per-shard partial results.

use std::collections::HashSet;

use bytes::Bytes;

/// A set operation the router can split across shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Inter,
    Union,
    Diff,
}

impl SetOp {
    /// The single-node command computing this operation.
    pub fn command(self) -> &'static str {
        match self {
            SetOp::Inter => "SINTER",
            SetOp::Union => "SUNION",
            SetOp::Diff => "SDIFF",
        }
    }

    /// The single-node command storing this operation's result.
    pub fn store_command(self) -> &'static str {
        match self {
            SetOp::Inter => "SINTERSTORE",
            SetOp::Union => "SUNIONSTORE",
            SetOp::Diff => "SDIFFSTORE",
        }
    }

    /// Command used to fetch one shard's partial result.
    ///
    /// For a difference only the group holding the first key is reduced
    /// with SDIFF; every later group is subtracted as a whole, so it is
    /// fetched as a union.
    pub fn fetch_command(self, first_group: bool) -> &'static str {
        match self {
            SetOp::Diff if !first_group => SetOp::Union.command(),
            op => op.command(),
        }
    }

    /// An empty partial result decides the whole intersection.
    pub fn short_circuits_on_empty(self) -> bool {
        self == SetOp::Inter
    }

    /// Folds partial results, given in group order, into the final set.
    ///
    /// Members keep the order in which they were first seen.
    pub fn combine(self, partials: Vec<Vec<Bytes>>) -> Vec<Bytes> {
        let mut iter = partials.into_iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut acc = dedup(first);
        for next in iter {
            match self {
                SetOp::Inter => {
                    let next: HashSet<Bytes> = next.into_iter().collect();
                    acc.retain(|m| next.contains(m));
                }
                SetOp::Union => {
                    let mut seen: HashSet<Bytes> = acc.iter().cloned().collect();
                    acc.extend(next.into_iter().filter(|m| seen.insert(m.clone())));
                }
                SetOp::Diff => {
                    let next: HashSet<Bytes> = next.into_iter().collect();
                    acc.retain(|m| !next.contains(m));
                }
            }
        }
        acc
    }
}

fn dedup(members: Vec<Bytes>) -> Vec<Bytes> {
    let mut seen = HashSet::with_capacity(members.len());
    members.into_iter().filter(|m| seen.insert(m.clone())).collect()
}
