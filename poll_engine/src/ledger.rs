//! The append-only vote ledger.
//!
//! Votes are sharded per poll. Each shard keeps its records and the set of
//! voters who already voted behind a single lock, so that checking for a
//! previous vote and appending the new one is one atomic step. Different
//! polls never contend with each other.
//!
//! Readers never hold a lock for longer than one page: since records are
//! only ever appended, the first `n` records of a shard never change, and a
//! scan that pins `n` when it is opened reads a consistent snapshot.
//!
//! A vote is checked against the poll as it is when the vote arrives. A
//! flag change that completes while the vote is being appended does not
//! reject it: the vote counts as cast before the change.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use snafu::{ensure, OptionExt};

use crate::config::*;
use crate::error::*;
use crate::lifecycle::{is_active_at, LifecycleManager};
use crate::store::PollStore;

/// Number of records read under one lock acquisition by a scan.
pub const DEFAULT_PAGE_SIZE: usize = 256;

#[derive(Debug, Default)]
struct PollVotes {
    records: Vec<VoteRecord>,
    voters: HashSet<UserId>,
}

type Shard = Arc<RwLock<PollVotes>>;

pub struct VoteLedger {
    polls: Arc<dyn PollStore>,
    lifecycle: LifecycleManager,
    shards: RwLock<HashMap<PollId, Shard>>,
    next_id: AtomicU64,
}

impl VoteLedger {
    pub fn new(polls: Arc<dyn PollStore>, lifecycle: LifecycleManager) -> VoteLedger {
        VoteLedger {
            polls,
            lifecycle,
            shards: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn shard(&self, poll_id: PollId) -> Option<Shard> {
        self.shards.read().get(&poll_id).cloned()
    }

    fn shard_or_create(&self, poll_id: PollId) -> Shard {
        if let Some(shard) = self.shard(poll_id) {
            return shard;
        }
        self.shards.write().entry(poll_id).or_default().clone()
    }

    /// Records a vote.
    ///
    /// For anonymous polls the voter identity is dropped and no uniqueness
    /// check applies. For all other polls a voter identity is required and
    /// at most one vote per voter is ever accepted, even when the same voter
    /// races with itself.
    pub fn cast_vote(
        &self,
        poll_id: PollId,
        voter_id: Option<UserId>,
        option_index: usize,
    ) -> PollResult<VoteRecord> {
        let poll = self.polls.get_poll(poll_id)?;
        let now = self.lifecycle.now();
        if !is_active_at(&poll, now) {
            warn!("cast_vote: poll {} is closed", poll_id);
            return PollClosedSnafu { poll_id }.fail();
        }
        ensure!(
            option_index < poll.options.len(),
            InvalidOptionSnafu {
                poll_id,
                option_index,
                option_count: poll.options.len(),
            }
        );
        let voter_id = if poll.is_anonymous() {
            None
        } else {
            Some(voter_id.context(VoterRequiredSnafu { poll_id })?)
        };

        let shard = self.shard_or_create(poll_id);
        let mut votes = shard.write();
        if let Some(voter) = &voter_id {
            if !votes.voters.insert(voter.clone()) {
                warn!("cast_vote: {} already voted in poll {}", voter, poll_id);
                return DuplicateVoteSnafu {
                    poll_id,
                    voter_id: voter.clone(),
                }
                .fail();
            }
        }
        let record = VoteRecord {
            id: VoteId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            poll_id,
            voter_id,
            option_index,
            cast_at: now,
        };
        votes.records.push(record.clone());
        info!(
            "Vote {} accepted in poll {} for option {}",
            record.id, poll_id, option_index
        );
        Ok(record)
    }

    /// Opens a scan over the votes of a poll, as they are at this instant.
    pub fn votes(&self, poll_id: PollId) -> PollResult<VoteScan> {
        self.polls.get_poll(poll_id)?;
        Ok(self.scan(poll_id, DEFAULT_PAGE_SIZE))
    }

    /// Same as [VoteLedger::votes], reading `page_size` records at a time.
    pub fn votes_paged(&self, poll_id: PollId, page_size: usize) -> PollResult<VoteScan> {
        self.polls.get_poll(poll_id)?;
        Ok(self.scan(poll_id, page_size.max(1)))
    }

    fn scan(&self, poll_id: PollId, page_size: usize) -> VoteScan {
        let shard = self.shard(poll_id);
        let end = shard.as_ref().map_or(0, |s| s.read().records.len());
        debug!("scan: poll {}: {} records", poll_id, end);
        VoteScan {
            shard,
            end,
            cursor: 0,
            page_size,
            buffer: VecDeque::new(),
        }
    }

    pub fn vote_count(&self, poll_id: PollId) -> usize {
        self.shard(poll_id).map_or(0, |s| s.read().records.len())
    }

    /// Every record of the ledger, by increasing id.
    pub fn all_votes(&self) -> Vec<VoteRecord> {
        let shards: Vec<Shard> = self.shards.read().values().cloned().collect();
        let mut res: Vec<VoteRecord> = Vec::new();
        for shard in shards {
            res.extend(shard.read().records.iter().cloned());
        }
        res.sort_by_key(|r| r.id);
        res
    }

    /// Loads persisted records back into the ledger.
    ///
    /// The records are checked against the stored polls: option ranges,
    /// voter presence and voter uniqueness must all hold. End times are not
    /// checked, since the votes were accepted in the past.
    pub fn restore(&self, mut records: Vec<VoteRecord>) -> PollResult<()> {
        records.sort_by_key(|r| r.id);
        let mut polls: HashMap<PollId, Poll> = HashMap::new();
        let mut seen_ids: HashSet<VoteId> = HashSet::new();
        for mut r in records {
            ensure!(
                seen_ids.insert(r.id),
                StorageSnafu {
                    message: format!("vote id {} is stored twice", r.id),
                }
            );
            if !polls.contains_key(&r.poll_id) {
                let poll = self.polls.get_poll(r.poll_id)?;
                polls.insert(r.poll_id, poll);
            }
            let poll = polls.get(&r.poll_id).context(NotFoundSnafu { poll_id: r.poll_id })?;
            ensure!(
                r.option_index < poll.options.len(),
                InvalidOptionSnafu {
                    poll_id: r.poll_id,
                    option_index: r.option_index,
                    option_count: poll.options.len(),
                }
            );
            if poll.is_anonymous() {
                r.voter_id = None;
            }
            let shard = self.shard_or_create(r.poll_id);
            let mut votes = shard.write();
            if !poll.is_anonymous() {
                let voter = r
                    .voter_id
                    .clone()
                    .context(VoterRequiredSnafu { poll_id: r.poll_id })?;
                if !votes.voters.insert(voter.clone()) {
                    return DuplicateVoteSnafu {
                        poll_id: r.poll_id,
                        voter_id: voter,
                    }
                    .fail();
                }
            }
            self.next_id.fetch_max(r.id.0 + 1, Ordering::SeqCst);
            votes.records.push(r);
        }
        debug!("restore: {} votes across {} polls", seen_ids.len(), polls.len());
        Ok(())
    }

    /// A SHA-256 digest chained over the records of a poll, in ledger order.
    ///
    /// Two ledgers holding the same votes for a poll produce the same digest.
    pub fn audit_digest(&self, poll_id: PollId) -> PollResult<String> {
        let scan = self.votes(poll_id)?;
        let mut digest = sha256::digest(format!("poll:{}", poll_id));
        for r in scan {
            let voter = r.voter_id.as_ref().map_or("-", |v| v.as_str());
            let line = format!(
                "{}|{}|{}|{}|{}",
                digest,
                r.id,
                voter,
                r.option_index,
                r.cast_at.to_rfc3339()
            );
            digest = sha256::digest(line);
        }
        Ok(digest)
    }
}

/// A lazy, finite, restartable sequence over the votes of one poll.
///
/// The scan only covers the records present when it was opened.
pub struct VoteScan {
    shard: Option<Shard>,
    end: usize,
    cursor: usize,
    page_size: usize,
    buffer: VecDeque<VoteRecord>,
}

impl VoteScan {
    /// Number of records covered by this scan.
    pub fn snapshot_len(&self) -> usize {
        self.end
    }

    /// Rewinds to the first record.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.buffer.clear();
    }

    /// Returns the next page of records, or None when the scan is exhausted.
    pub fn next_page(&mut self) -> Option<Vec<VoteRecord>> {
        if !self.buffer.is_empty() {
            return Some(self.buffer.drain(..).collect());
        }
        let page = self.read_page();
        if page.is_empty() {
            None
        } else {
            Some(page)
        }
    }

    fn read_page(&mut self) -> Vec<VoteRecord> {
        let shard = match &self.shard {
            Some(s) => s,
            None => return Vec::new(),
        };
        if self.cursor >= self.end {
            return Vec::new();
        }
        let upper = (self.cursor + self.page_size).min(self.end);
        let page = shard.read().records[self.cursor..upper].to_vec();
        self.cursor = upper;
        page
    }
}

impl Iterator for VoteScan {
    type Item = VoteRecord;

    fn next(&mut self) -> Option<VoteRecord> {
        if self.buffer.is_empty() {
            let page = self.read_page();
            self.buffer.extend(page);
        }
        self.buffer.pop_front()
    }
}
