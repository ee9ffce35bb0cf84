//! Engine phase and per-slot vote bookkeeping.

use crate::message::{Commit, Prepare};
use crate::{SequenceNumber, ViewNumber};
use std::collections::HashMap;

/// Phase of the engine's current slot. Never decreases within a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PbftPhase {
    /// Waiting for a pre-prepare.
    Idle,
    /// Proposal adopted, collecting prepares.
    PrePrepared,
    /// 2f+1 prepares seen, collecting commits.
    Prepared,
    /// 2f+1 commits seen, slot finalized.
    Committed,
}

impl PbftPhase {
    pub fn as_tag(&self) -> &'static str {
        match self {
            PbftPhase::Idle => "idle",
            PbftPhase::PrePrepared => "pre_prepared",
            PbftPhase::Prepared => "prepared",
            PbftPhase::Committed => "committed",
        }
    }
}

/// Slot identifier: `(view, sequence)`.
pub type SlotKey = (ViewNumber, SequenceNumber);

/// Accepted and pending votes, deduplicated by sender per slot.
///
/// Pending maps hold votes that arrived before this node entered the
/// phase that accepts them; they are drained exactly once, when the
/// node seeds the slot with its own vote.
#[derive(Debug, Default)]
pub struct VoteLog {
    prepares: HashMap<SlotKey, HashMap<String, Prepare>>,
    commits: HashMap<SlotKey, HashMap<String, Commit>>,
    pending_prepares: HashMap<SlotKey, HashMap<String, Prepare>>,
    pending_commits: HashMap<SlotKey, HashMap<String, Commit>>,
}

impl VoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a prepare vote; returns the slot's accepted count.
    pub fn insert_prepare(&mut self, msg: Prepare) -> usize {
        let key = (msg.view_number, msg.sequence_number);
        let slot = self.prepares.entry(key).or_default();
        slot.entry(msg.node_id.clone()).or_insert(msg);
        slot.len()
    }

    /// Buffer a prepare that arrived before this node pre-prepared.
    pub fn buffer_prepare(&mut self, msg: Prepare) {
        let key = (msg.view_number, msg.sequence_number);
        self.pending_prepares
            .entry(key)
            .or_default()
            .entry(msg.node_id.clone())
            .or_insert(msg);
    }

    /// Move buffered prepares for `key` into the accepted set, skipping
    /// senders already counted. Returns the accepted count afterwards.
    pub fn drain_pending_prepares(&mut self, key: SlotKey) -> usize {
        if let Some(pending) = self.pending_prepares.remove(&key) {
            let slot = self.prepares.entry(key).or_default();
            for (sender, msg) in pending {
                slot.entry(sender).or_insert(msg);
            }
        }
        self.prepare_count(key)
    }

    pub fn prepare_count(&self, key: SlotKey) -> usize {
        self.prepares.get(&key).map(|s| s.len()).unwrap_or(0)
    }

    /// Accept a commit vote; returns the slot's accepted count.
    pub fn insert_commit(&mut self, msg: Commit) -> usize {
        let key = (msg.view_number, msg.sequence_number);
        let slot = self.commits.entry(key).or_default();
        slot.entry(msg.node_id.clone()).or_insert(msg);
        slot.len()
    }

    /// Buffer a commit that arrived before this node prepared.
    pub fn buffer_commit(&mut self, msg: Commit) {
        let key = (msg.view_number, msg.sequence_number);
        self.pending_commits
            .entry(key)
            .or_default()
            .entry(msg.node_id.clone())
            .or_insert(msg);
    }

    /// Move buffered commits for `key` into the accepted set, skipping
    /// senders already counted. Returns the accepted count afterwards.
    pub fn drain_pending_commits(&mut self, key: SlotKey) -> usize {
        if let Some(pending) = self.pending_commits.remove(&key) {
            let slot = self.commits.entry(key).or_default();
            for (sender, msg) in pending {
                slot.entry(sender).or_insert(msg);
            }
        }
        self.commit_count(key)
    }

    pub fn commit_count(&self, key: SlotKey) -> usize {
        self.commits.get(&key).map(|s| s.len()).unwrap_or(0)
    }

    /// Drop all bookkeeping for a finalized slot.
    pub fn clear_slot(&mut self, key: SlotKey) {
        self.prepares.remove(&key);
        self.commits.remove(&key);
        self.pending_prepares.remove(&key);
        self.pending_commits.remove(&key);
    }
}
