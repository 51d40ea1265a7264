//! Storage of poll definitions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use snafu::{ensure, OptionExt};

use crate::config::*;
use crate::error::*;
use crate::lifecycle::apply_flags_at;

/// Store-level predicates used when listing polls.
///
/// Text and outcome filtering depend on the options and on the current time,
/// and are handled by the archive.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PollFilter {
    pub region: Option<String>,
    pub topic: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl PollFilter {
    pub fn matches(&self, poll: &Poll) -> bool {
        same_label(&self.region, &poll.region)
            && same_label(&self.topic, &poll.topic)
            && self.created_from.map_or(true, |from| poll.created_at >= from)
            && self.created_to.map_or(true, |to| poll.created_at <= to)
    }
}

// A missing filter matches everything, a missing value matches no filter.
fn same_label(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(w), Some(a)) => w.trim().to_lowercase() == a.trim().to_lowercase(),
        (Some(_), None) => false,
    }
}

/// Persistence of poll definitions.
///
/// Implementations must apply `update_flags` atomically with respect to other
/// updates of the same poll.
pub trait PollStore: Send + Sync {
    fn create_poll(&self, spec: PollSpec, now: DateTime<Utc>) -> PollResult<Poll>;

    fn get_poll(&self, id: PollId) -> PollResult<Poll>;

    /// All the polls matching the filter, by increasing id.
    fn list_polls(&self, filter: &PollFilter) -> PollResult<Vec<Poll>>;

    fn update_flags(
        &self,
        id: PollId,
        update: &FlagUpdate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PollResult<Poll>;
}

/// Checks a creation request and returns it normalized (trimmed strings,
/// empty optional strings dropped).
pub fn validate_spec(spec: PollSpec, limits: &Limits, now: DateTime<Utc>) -> PollResult<PollSpec> {
    let title = spec.title.trim().to_string();
    ensure!(
        !title.is_empty(),
        ValidationSnafu {
            reason: "the title is empty"
        }
    );
    ensure!(
        title.chars().count() <= limits.max_title_length,
        ValidationSnafu {
            reason: format!(
                "the title is longer than {} characters",
                limits.max_title_length
            ),
        }
    );

    let options: Vec<String> = spec.options.iter().map(|o| o.trim().to_string()).collect();
    ensure!(
        options.len() >= 2,
        ValidationSnafu {
            reason: format!("at least 2 options are required, got {}", options.len()),
        }
    );
    ensure!(
        options.len() <= limits.max_options,
        ValidationSnafu {
            reason: format!(
                "at most {} options are allowed, got {}",
                limits.max_options,
                options.len()
            ),
        }
    );
    if let Some(idx) = options.iter().position(|o| o.is_empty()) {
        return ValidationSnafu {
            reason: format!("option {} is blank", idx),
        }
        .fail();
    }

    if let Some(ends_at) = spec.ends_at {
        ensure!(
            ends_at > now,
            ValidationSnafu {
                reason: format!("the end time {} is not in the future", ends_at),
            }
        );
    }

    Ok(PollSpec {
        title,
        description: non_blank(spec.description),
        options,
        creator_id: spec.creator_id,
        ends_at: spec.ends_at,
        privacy_mode: spec.privacy_mode,
        region: non_blank(spec.region),
        topic: non_blank(spec.topic),
    })
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

/// In-process poll store.
#[derive(Debug)]
pub struct MemoryPollStore {
    polls: RwLock<BTreeMap<PollId, Poll>>,
    next_id: AtomicU64,
    limits: Limits,
}

impl MemoryPollStore {
    pub fn new(limits: Limits) -> MemoryPollStore {
        MemoryPollStore {
            polls: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            limits,
        }
    }

    /// Rebuilds a store from previously persisted polls.
    ///
    /// Persisted polls are archived history: their end times are not checked
    /// against the current time.
    pub fn from_polls(polls: Vec<Poll>, limits: Limits) -> PollResult<MemoryPollStore> {
        let mut by_id: BTreeMap<PollId, Poll> = BTreeMap::new();
        for p in polls {
            ensure!(
                p.options.len() >= 2,
                ValidationSnafu {
                    reason: format!("stored poll {} has fewer than 2 options", p.id),
                }
            );
            let id = p.id;
            if by_id.insert(id, p).is_some() {
                return ValidationSnafu {
                    reason: format!("poll id {} is stored twice", id),
                }
                .fail();
            }
        }
        let next_id = by_id.keys().last().map_or(1, |id| id.0 + 1);
        debug!(
            "from_polls: restored {} polls, next id {}",
            by_id.len(),
            next_id
        );
        Ok(MemoryPollStore {
            polls: RwLock::new(by_id),
            next_id: AtomicU64::new(next_id),
            limits,
        })
    }
}

impl PollStore for MemoryPollStore {
    fn create_poll(&self, spec: PollSpec, now: DateTime<Utc>) -> PollResult<Poll> {
        let spec = validate_spec(spec, &self.limits, now)?;
        let id = PollId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let poll = Poll {
            id,
            title: spec.title,
            description: spec.description,
            options: spec.options,
            creator_id: spec.creator_id,
            created_at: now,
            ends_at: spec.ends_at,
            privacy_mode: spec.privacy_mode,
            region: spec.region,
            topic: spec.topic,
            is_active: true,
        };
        self.polls.write().insert(id, poll.clone());
        info!(
            "Created poll {} by {} with {} options",
            id,
            poll.creator_id,
            poll.options.len()
        );
        Ok(poll)
    }

    fn get_poll(&self, id: PollId) -> PollResult<Poll> {
        self.polls
            .read()
            .get(&id)
            .cloned()
            .context(NotFoundSnafu { poll_id: id })
    }

    fn list_polls(&self, filter: &PollFilter) -> PollResult<Vec<Poll>> {
        let polls = self.polls.read();
        Ok(polls.values().filter(|p| filter.matches(p)).cloned().collect())
    }

    fn update_flags(
        &self,
        id: PollId,
        update: &FlagUpdate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> PollResult<Poll> {
        let mut polls = self.polls.write();
        let current = polls.get_mut(&id).context(NotFoundSnafu { poll_id: id })?;
        if !current.may_change_flags(actor) {
            warn!("update_flags: {} is not allowed to change poll {}", actor.id, id);
            return UnauthorizedSnafu {
                poll_id: id,
                actor_id: actor.id.clone(),
            }
            .fail();
        }
        let next = apply_flags_at(current, update, now)?;
        *current = next.clone();
        info!("Poll {} flags updated by {}: {:?}", id, actor.id, update);
        Ok(next)
    }
}
