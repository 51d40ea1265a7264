//! Aggregation of votes into counts, percentages and winners.
//!
//! Percentages are rounded with the largest-remainder method, in integer
//! arithmetic: every option gets the floor of its exact share, and the points
//! still missing to reach 100 go one by one to the largest remainders, the
//! lowest option index first on equal remainders.
//!
//! Winners are all the options sharing the highest count. Ties are reported
//! as co-winners, never broken.

use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::config::*;
use crate::error::*;
use crate::ledger::VoteLedger;
use crate::lifecycle::LifecycleManager;
use crate::store::PollStore;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

/// Tallies the given votes for a poll.
///
/// Records belonging to another poll or pointing outside the options are
/// skipped (the ledger never stores such records).
pub fn tally_votes<I>(poll: &Poll, votes: I, computed_at: DateTime<Utc>) -> TallyResult
where
    I: IntoIterator<Item = VoteRecord>,
{
    let mut counts: Vec<VoteCount> = vec![VoteCount::EMPTY; poll.options.len()];
    for v in votes {
        if v.poll_id != poll.id {
            warn!(
                "tally_votes: poll {}: skipping vote {} of poll {}",
                poll.id, v.id, v.poll_id
            );
            continue;
        }
        match counts.get_mut(v.option_index) {
            Some(c) => *c += VoteCount(1),
            None => warn!(
                "tally_votes: poll {}: skipping vote {} for missing option {}",
                poll.id, v.id, v.option_index
            ),
        }
    }
    let total: VoteCount = counts.iter().cloned().sum();
    let percentages = largest_remainder(&counts, total);
    let winners = find_winners(&counts);
    debug!(
        "tally_votes: poll {}: counts {:?} percentages {:?} winners {:?}",
        poll.id, counts, percentages, winners
    );
    TallyResult {
        poll_id: poll.id,
        counts: counts.iter().map(|c| c.0).collect(),
        total_votes: total.0,
        percentages,
        winners,
        computed_at,
    }
}

fn largest_remainder(counts: &[VoteCount], total: VoteCount) -> Vec<u32> {
    if total == VoteCount::EMPTY {
        return vec![0; counts.len()];
    }
    let total = total.0 as u128;
    // (floor of the share, remainder of the share, option index)
    let mut shares: Vec<(u32, u128, usize)> = counts
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let scaled = c.0 as u128 * 100;
            ((scaled / total) as u32, scaled % total, idx)
        })
        .collect();
    let assigned: u32 = shares.iter().map(|s| s.0).sum();
    let missing = 100 - assigned as usize;

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| {
        shares[*b]
            .1
            .cmp(&shares[*a].1)
            .then(shares[*a].2.cmp(&shares[*b].2))
    });
    for idx in order.into_iter().take(missing) {
        shares[idx].0 += 1;
    }
    shares.iter().map(|s| s.0).collect()
}

fn find_winners(counts: &[VoteCount]) -> BTreeSet<usize> {
    let top = counts.iter().max().cloned().unwrap_or(VoteCount::EMPTY);
    counts
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| if *c == top { Some(idx) } else { None })
        .collect()
}

/// Computes tallies from the current state of the ledger.
///
/// Holds no state of its own: the same ledger contents always produce the same
/// counts, percentages and winners.
pub struct TallyEngine {
    polls: Arc<dyn PollStore>,
    ledger: Arc<VoteLedger>,
    lifecycle: LifecycleManager,
}

impl TallyEngine {
    pub fn new(
        polls: Arc<dyn PollStore>,
        ledger: Arc<VoteLedger>,
        lifecycle: LifecycleManager,
    ) -> TallyEngine {
        TallyEngine {
            polls,
            ledger,
            lifecycle,
        }
    }

    pub fn compute_tally(&self, poll_id: PollId) -> PollResult<TallyResult> {
        let poll = self.polls.get_poll(poll_id)?;
        self.tally_for(&poll)
    }

    /// Tallies a poll already fetched by the caller.
    pub fn tally_for(&self, poll: &Poll) -> PollResult<TallyResult> {
        let scan = self.ledger.votes(poll.id)?;
        Ok(tally_votes(poll, scan, self.lifecycle.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    fn poll(options: &[&str]) -> Poll {
        Poll {
            id: PollId(3),
            title: "Playground".to_string(),
            description: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            creator_id: UserId::from("alice"),
            created_at: at(),
            ends_at: None,
            privacy_mode: PrivacyMode::Anonymous,
            region: None,
            topic: None,
            is_active: true,
        }
    }

    fn votes(poll_id: PollId, choices: &[usize]) -> Vec<VoteRecord> {
        choices
            .iter()
            .enumerate()
            .map(|(i, c)| VoteRecord {
                id: VoteId(i as u64 + 1),
                poll_id,
                voter_id: None,
                option_index: *c,
                cast_at: at(),
            })
            .collect()
    }

    fn percentages(counts: &[u64]) -> Vec<u32> {
        let counts: Vec<VoteCount> = counts.iter().map(|c| VoteCount(*c)).collect();
        let total = counts.iter().cloned().sum();
        largest_remainder(&counts, total)
    }

    #[test]
    fn single_winner() {
        let p = poll(&["A", "B", "C"]);
        let res = tally_votes(&p, votes(p.id, &[0, 0, 1]), at());
        assert_eq!(res.counts, vec![2, 1, 0]);
        assert_eq!(res.total_votes, 3);
        assert_eq!(res.percentages, vec![67, 33, 0]);
        assert_eq!(res.winners, BTreeSet::from([0]));
        assert!(!res.is_tie());
        assert_eq!(res.leaders(&p), vec!["A"]);
        assert_eq!(res.computed_at, at());
    }

    #[test]
    fn co_winners() {
        let p = poll(&["X", "Y"]);
        let res = tally_votes(&p, votes(p.id, &[0, 1]), at());
        assert_eq!(res.counts, vec![1, 1]);
        assert_eq!(res.percentages, vec![50, 50]);
        assert_eq!(res.winners, BTreeSet::from([0, 1]));
        assert!(res.is_tie());
        assert_eq!(res.leaders(&p), vec!["X", "Y"]);
    }

    #[test]
    fn no_votes() {
        let p = poll(&["A", "B", "C"]);
        let res = tally_votes(&p, Vec::new(), at());
        assert_eq!(res.counts, vec![0, 0, 0]);
        assert_eq!(res.total_votes, 0);
        assert_eq!(res.percentages, vec![0, 0, 0]);
        assert_eq!(res.winners, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn remainders_go_to_the_largest_then_lowest_index() {
        // 1/3 each: 33.33 three times, the missing point goes to option 0.
        assert_eq!(percentages(&[1, 1, 1]), vec![34, 33, 33]);
        // 1/6, 2/6, 3/6 -> 16.67, 33.33, 50
        assert_eq!(percentages(&[1, 2, 3]), vec![17, 33, 50]);
        // 1/7 * 100 = 14.28 for six options, 2/7 = 28.57
        assert_eq!(percentages(&[1, 1, 1, 1, 1, 2]), vec![15, 14, 14, 14, 14, 29]);
        assert_eq!(percentages(&[0, 5]), vec![0, 100]);
        assert_eq!(percentages(&[2, 1, 0]), vec![67, 33, 0]);
    }

    #[test]
    fn skips_foreign_records() {
        let p = poll(&["A", "B"]);
        let mut vs = votes(p.id, &[0, 1, 1]);
        vs.extend(votes(PollId(99), &[0, 0]));
        vs.push(VoteRecord {
            id: VoteId(100),
            poll_id: p.id,
            voter_id: None,
            option_index: 5,
            cast_at: at(),
        });
        let res = tally_votes(&p, vs, at());
        assert_eq!(res.counts, vec![1, 2]);
        assert_eq!(res.total_votes, 3);
    }
}
