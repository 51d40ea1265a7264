//! Browsing and searching polls, including the ones that have ended.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::*;
use crate::error::*;
use crate::lifecycle::{outcome_at, LifecycleManager};
use crate::store::{PollFilter, PollStore};
use crate::tally::TallyEngine;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveFilters {
    /// Case-insensitive substring of the title, the description or an option.
    pub search_text: Option<String>,
    pub region: Option<String>,
    pub topic: Option<String>,
    pub outcome: Option<Outcome>,
    /// Inclusive bounds on the creation time.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// 1-based page request. `per_page` falls back to the configured default.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub per_page: Option<usize>,
}

impl Page {
    pub const FIRST: Page = Page {
        number: 1,
        per_page: None,
    };
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub poll: Poll,
    pub outcome: Outcome,
    pub tally: TallyResult,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePage {
    pub entries: Vec<ArchiveEntry>,
    pub page: usize,
    pub per_page: usize,
    pub total_matches: usize,
    pub total_pages: usize,
}

fn matches_text(poll: &Poll, needle: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    contains(&poll.title)
        || poll.description.as_deref().map_or(false, contains)
        || poll.options.iter().any(|o| contains(o))
}

pub struct ArchiveQueryService {
    polls: Arc<dyn PollStore>,
    lifecycle: LifecycleManager,
    tally: Arc<TallyEngine>,
    settings: ArchiveSettings,
}

impl ArchiveQueryService {
    pub fn new(
        polls: Arc<dyn PollStore>,
        lifecycle: LifecycleManager,
        tally: Arc<TallyEngine>,
        settings: ArchiveSettings,
    ) -> ArchiveQueryService {
        ArchiveQueryService {
            polls,
            lifecycle,
            tally,
            settings,
        }
    }

    /// Returns one page of matching polls with their results, newest first
    /// (equal creation times by increasing id).
    ///
    /// Outcomes are evaluated once, at the start of the query. Tallies are
    /// only computed for the entries of the requested page.
    pub fn query(&self, filters: &ArchiveFilters, page: &Page) -> PollResult<ArchivePage> {
        ensure!(
            page.number >= 1,
            ValidationSnafu {
                reason: "page numbers start at 1"
            }
        );
        let per_page = page
            .per_page
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size.max(1));

        let store_filter = PollFilter {
            region: filters.region.clone(),
            topic: filters.topic.clone(),
            created_from: filters.date_from,
            created_to: filters.date_to,
        };
        let needle = filters
            .search_text
            .as_ref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let now = self.lifecycle.now();

        let mut matching: Vec<(Poll, Outcome)> = self
            .polls
            .list_polls(&store_filter)?
            .into_iter()
            .filter(|p| needle.as_deref().map_or(true, |n| matches_text(p, n)))
            .map(|p| {
                let outcome = outcome_at(&p, now);
                (p, outcome)
            })
            .filter(|(_, outcome)| filters.outcome.map_or(true, |o| o == *outcome))
            .collect();
        matching.sort_by_key(|(p, _)| (Reverse(p.created_at), p.id));

        let total_matches = matching.len();
        let total_pages = (total_matches + per_page - 1) / per_page;
        debug!(
            "query: {:?}: {} matches, page {} of {}",
            filters, total_matches, page.number, total_pages
        );

        let mut entries: Vec<ArchiveEntry> = Vec::new();
        for (poll, outcome) in matching
            .into_iter()
            .skip((page.number - 1).saturating_mul(per_page))
            .take(per_page)
        {
            let tally = self.tally.tally_for(&poll)?;
            entries.push(ArchiveEntry {
                poll,
                outcome,
                tally,
            });
        }
        Ok(ArchivePage {
            entries,
            page: page.number,
            per_page,
            total_matches,
            total_pages,
        })
    }
}
