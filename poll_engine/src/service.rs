use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveFilters, ArchivePage, ArchiveQueryService, Page};
use crate::config::*;
use crate::error::*;
use crate::ledger::{VoteLedger, VoteScan};
use crate::lifecycle::{Clock, LifecycleManager};
use crate::store::{MemoryPollStore, PollFilter, PollStore};
use crate::tally::TallyEngine;

/// The persisted state of the engine: every poll and every accepted vote.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub polls: Vec<Poll>,
    pub votes: Vec<VoteRecord>,
}

/// The poll service API, consumed by the display layer.
///
/// All the components share the same clock, so that a request sees one
/// consistent notion of "now" across lifecycle checks and tallies.
pub struct PollService {
    config: EngineConfig,
    lifecycle: LifecycleManager,
    polls: Arc<dyn PollStore>,
    ledger: Arc<VoteLedger>,
    tally: Arc<TallyEngine>,
    archive: ArchiveQueryService,
}

impl PollService {
    /// A service with an empty in-memory store.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> PollService {
        let store = Arc::new(MemoryPollStore::new(config.limits));
        PollService::with_store(config, clock, store)
    }

    pub fn with_store(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        polls: Arc<dyn PollStore>,
    ) -> PollService {
        let lifecycle = LifecycleManager::new(clock);
        let ledger = Arc::new(VoteLedger::new(polls.clone(), lifecycle.clone()));
        let tally = Arc::new(TallyEngine::new(
            polls.clone(),
            ledger.clone(),
            lifecycle.clone(),
        ));
        let archive = ArchiveQueryService::new(
            polls.clone(),
            lifecycle.clone(),
            tally.clone(),
            config.archive,
        );
        PollService {
            config,
            lifecycle,
            polls,
            ledger,
            tally,
            archive,
        }
    }

    /// Rebuilds a service from persisted state, checking the vote invariants.
    pub fn from_snapshot(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        snapshot: Snapshot,
    ) -> PollResult<PollService> {
        let num_polls = snapshot.polls.len();
        let num_votes = snapshot.votes.len();
        let store = Arc::new(MemoryPollStore::from_polls(snapshot.polls, config.limits)?);
        let service = PollService::with_store(config, clock, store);
        service.ledger.restore(snapshot.votes)?;
        info!("Restored {} polls and {} votes", num_polls, num_votes);
        Ok(service)
    }

    pub fn snapshot(&self) -> PollResult<Snapshot> {
        Ok(Snapshot {
            polls: self.polls.list_polls(&PollFilter::default())?,
            votes: self.ledger.all_votes(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn create_poll(&self, spec: PollSpec) -> PollResult<Poll> {
        self.polls.create_poll(spec, self.lifecycle.now())
    }

    pub fn get_poll(&self, poll_id: PollId) -> PollResult<Poll> {
        self.polls.get_poll(poll_id)
    }

    pub fn cast_vote(
        &self,
        poll_id: PollId,
        option_index: usize,
        voter_id: Option<UserId>,
    ) -> PollResult<VoteRecord> {
        self.ledger.cast_vote(poll_id, voter_id, option_index)
    }

    pub fn get_results(&self, poll_id: PollId) -> PollResult<TallyResult> {
        self.tally.compute_tally(poll_id)
    }

    pub fn outcome(&self, poll_id: PollId) -> PollResult<Outcome> {
        let poll = self.polls.get_poll(poll_id)?;
        Ok(self.lifecycle.outcome(&poll))
    }

    pub fn query_archive(&self, filters: &ArchiveFilters, page: &Page) -> PollResult<ArchivePage> {
        self.archive.query(filters, page)
    }

    /// Changes the flags of a poll on behalf of `actor_id`. The actor is an
    /// admin when listed in the configuration.
    pub fn set_flags(
        &self,
        poll_id: PollId,
        update: &FlagUpdate,
        actor_id: &UserId,
    ) -> PollResult<Poll> {
        let actor = Actor {
            id: actor_id.clone(),
            is_admin: self.config.is_admin(actor_id),
        };
        self.polls
            .update_flags(poll_id, update, &actor, self.lifecycle.now())
    }

    pub fn votes(&self, poll_id: PollId) -> PollResult<VoteScan> {
        self.ledger.votes(poll_id)
    }

    pub fn audit_digest(&self, poll_id: PollId) -> PollResult<String> {
        self.ledger.audit_digest(poll_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PollSpecBuilder;
    use crate::lifecycle::ManualClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap()
    }

    fn service() -> (Arc<ManualClock>, PollService) {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut config = EngineConfig::DEFAULT;
        config.admins.push(UserId::from("moderator"));
        (clock.clone(), PollService::new(config, clock))
    }

    fn voter(name: &str) -> Option<UserId> {
        Some(UserId::from(name))
    }

    #[test]
    fn vote_and_read_results() {
        let (_, s) = service();
        let p = s
            .create_poll(
                PollSpecBuilder::new("Town hall colour", "alice")
                    .options(&["A", "B", "C"])
                    .build(),
            )
            .unwrap();
        s.cast_vote(p.id, 0, voter("u1")).unwrap();
        s.cast_vote(p.id, 0, voter("u2")).unwrap();
        s.cast_vote(p.id, 1, voter("u3")).unwrap();
        let err = s.cast_vote(p.id, 3, voter("u4")).unwrap_err();
        assert_eq!(err.kind(), "invalid_option");

        let res = s.get_results(p.id).unwrap();
        assert_eq!(res.counts, vec![2, 1, 0]);
        assert_eq!(res.percentages, vec![67, 33, 0]);
        assert_eq!(res.winners, BTreeSet::from([0]));
        assert_eq!(res.counts.iter().sum::<u64>(), s.votes(p.id).unwrap().count() as u64);
    }

    #[test]
    fn flags_and_admins() {
        let (clock, s) = service();
        let p = s
            .create_poll(
                PollSpecBuilder::new("Noise ordinance", "alice")
                    .options(&["Keep", "Relax"])
                    .ends_at(t0() + Duration::days(7))
                    .build(),
            )
            .unwrap();
        let off = FlagUpdate {
            is_active: Some(false),
            ends_at: None,
        };
        let err = s.set_flags(p.id, &off, &UserId::from("bob")).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");

        let updated = s.set_flags(p.id, &off, &UserId::from("moderator")).unwrap();
        assert!(!updated.is_active);
        assert_eq!(s.outcome(p.id).unwrap(), Outcome::Completed);
        let err = s.cast_vote(p.id, 0, voter("u1")).unwrap_err();
        assert_eq!(err.kind(), "poll_closed");

        clock.advance(Duration::days(8));
        assert_eq!(s.outcome(p.id).unwrap(), Outcome::Expired);
        let res = s.get_results(p.id).unwrap();
        assert_eq!(res.total_votes, 0);
        assert_eq!(res.computed_at, t0() + Duration::days(8));
    }

    #[test]
    fn snapshot_round_trip_keeps_uniqueness() {
        let (clock, s) = service();
        let p = s
            .create_poll(
                PollSpecBuilder::new("Market day", "alice")
                    .options(&["Saturday", "Sunday"])
                    .build(),
            )
            .unwrap();
        s.cast_vote(p.id, 1, voter("u1")).unwrap();
        let snapshot = s.snapshot().unwrap();

        let restored =
            PollService::from_snapshot(s.config().clone(), clock, snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot().unwrap(), snapshot);
        let err = restored.cast_vote(p.id, 0, voter("u1")).unwrap_err();
        assert_eq!(err.kind(), "duplicate_vote");
        assert_eq!(
            restored.audit_digest(p.id).unwrap(),
            s.audit_digest(p.id).unwrap()
        );
    }

    #[test]
    fn snapshot_json_layout() {
        let (_, s) = service();
        let p = s
            .create_poll(
                PollSpecBuilder::new("Harbour lights", "alice")
                    .options(&["Blue", "White"])
                    .privacy(PrivacyMode::Anonymous)
                    .build(),
            )
            .unwrap();
        s.cast_vote(p.id, 1, voter("u1")).unwrap();

        let js = serde_json::to_value(s.snapshot().unwrap()).unwrap();
        assert_eq!(js["polls"][0]["id"], serde_json::json!(1));
        assert_eq!(js["polls"][0]["privacy_mode"], serde_json::json!("anonymous"));
        assert!(js["polls"][0].get("region").is_none());
        assert_eq!(js["votes"][0]["poll_id"], serde_json::json!(1));
        assert_eq!(js["votes"][0]["voter_id"], serde_json::Value::Null);

        let back: Snapshot = serde_json::from_value(js).unwrap();
        assert_eq!(back, s.snapshot().unwrap());

        let tally = serde_json::to_value(s.get_results(p.id).unwrap()).unwrap();
        assert_eq!(tally["counts"], serde_json::json!([0, 1]));
        assert_eq!(tally["percentages"], serde_json::json!([0, 100]));
        assert_eq!(tally["winners"], serde_json::json!([1]));
    }

    fn archive_fixture() -> (Arc<ManualClock>, PollService, Vec<Poll>) {
        let (clock, s) = service();
        let mut polls = Vec::new();
        // 1: expires after a day, stored flag stays on.
        polls.push(
            s.create_poll(
                PollSpecBuilder::new("Bike lanes on Main Street", "alice")
                    .options(&["Yes", "No"])
                    .region("Downtown")
                    .topic("transport")
                    .ends_at(t0() + Duration::days(1))
                    .build(),
            )
            .unwrap(),
        );
        // 2: switched off by its owner.
        polls.push(
            s.create_poll(
                PollSpecBuilder::new("Library budget", "bob")
                    .options(&["More books", "More computers"])
                    .description("Allocation of the 2025 library budget")
                    .region("Uptown")
                    .build(),
            )
            .unwrap(),
        );
        clock.advance(Duration::hours(1));
        // 3: still running, created later.
        polls.push(
            s.create_poll(
                PollSpecBuilder::new("Dog park", "carol")
                    .options(&["North lot", "South lot", "Bike path corner"])
                    .region("Downtown")
                    .build(),
            )
            .unwrap(),
        );
        s.set_flags(
            polls[1].id,
            &FlagUpdate {
                is_active: Some(false),
                ends_at: None,
            },
            &UserId::from("bob"),
        )
        .unwrap();
        s.cast_vote(polls[0].id, 0, voter("u1")).unwrap();
        s.cast_vote(polls[0].id, 0, voter("u2")).unwrap();
        s.cast_vote(polls[2].id, 2, voter("u1")).unwrap();
        clock.advance(Duration::days(2));
        (clock, s, polls)
    }

    fn ids(page: &ArchivePage) -> Vec<PollId> {
        page.entries.iter().map(|e| e.poll.id).collect()
    }

    #[test]
    fn archive_orders_newest_first() {
        let (_, s, polls) = archive_fixture();
        let page = s
            .query_archive(&ArchiveFilters::default(), &Page::FIRST)
            .unwrap();
        assert_eq!(ids(&page), vec![polls[2].id, polls[0].id, polls[1].id]);
        assert_eq!(page.total_matches, 3);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.entries[1].tally.counts, vec![2, 0]);
        assert_eq!(page.entries[0].tally.winners, BTreeSet::from([2]));
    }

    #[test]
    fn archive_outcome_filter_uses_the_lifecycle() {
        let (_, s, polls) = archive_fixture();
        let by_outcome = |outcome: Outcome| {
            let filters = ArchiveFilters {
                outcome: Some(outcome),
                ..ArchiveFilters::default()
            };
            ids(&s.query_archive(&filters, &Page::FIRST).unwrap())
        };
        // Poll 1 still has is_active = true but its end time has passed.
        assert!(s.get_poll(polls[0].id).unwrap().is_active);
        assert_eq!(by_outcome(Outcome::Expired), vec![polls[0].id]);
        assert_eq!(by_outcome(Outcome::Completed), vec![polls[1].id]);
        assert_eq!(by_outcome(Outcome::Active), vec![polls[2].id]);
    }

    #[test]
    fn archive_text_region_and_dates() {
        let (_, s, polls) = archive_fixture();
        let run = |filters: ArchiveFilters| ids(&s.query_archive(&filters, &Page::FIRST).unwrap());

        // Matches a title and an option label.
        let bike = run(ArchiveFilters {
            search_text: Some("BIKE".to_string()),
            ..ArchiveFilters::default()
        });
        assert_eq!(bike, vec![polls[2].id, polls[0].id]);

        // Matches the description only.
        let budget = run(ArchiveFilters {
            search_text: Some("allocation".to_string()),
            ..ArchiveFilters::default()
        });
        assert_eq!(budget, vec![polls[1].id]);

        let downtown = run(ArchiveFilters {
            region: Some("downtown".to_string()),
            ..ArchiveFilters::default()
        });
        assert_eq!(downtown, vec![polls[2].id, polls[0].id]);

        let first_batch = run(ArchiveFilters {
            date_to: Some(t0()),
            ..ArchiveFilters::default()
        });
        assert_eq!(first_batch, vec![polls[0].id, polls[1].id]);

        let none = run(ArchiveFilters {
            topic: Some("transport".to_string()),
            outcome: Some(Outcome::Active),
            ..ArchiveFilters::default()
        });
        assert!(none.is_empty());
    }

    #[test]
    fn archive_pagination() {
        let (_, s, polls) = archive_fixture();
        let page = |number: usize| {
            s.query_archive(
                &ArchiveFilters::default(),
                &Page {
                    number,
                    per_page: Some(2),
                },
            )
        };
        let first = page(1).unwrap();
        assert_eq!(ids(&first), vec![polls[2].id, polls[0].id]);
        assert_eq!(first.total_pages, 2);
        let second = page(2).unwrap();
        assert_eq!(ids(&second), vec![polls[1].id]);
        assert!(page(3).unwrap().entries.is_empty());
        assert_eq!(page(0).unwrap_err().kind(), "validation");

        let huge = s
            .query_archive(
                &ArchiveFilters::default(),
                &Page {
                    number: 1,
                    per_page: Some(10_000),
                },
            )
            .unwrap();
        assert_eq!(huge.per_page, EngineConfig::DEFAULT.archive.max_page_size);
    }
}
