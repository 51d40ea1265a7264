// ********* Identifiers ***********

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PollId(pub u64);

impl Display for PollId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VoteId(pub u64);

impl Display for VoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An identity handed out by the identity provider. Used for voters, poll
/// creators and actors changing flags.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

// ********* Input data structures ***********

/// Who can see and attribute the votes of a poll.
///
/// Only `Anonymous` changes the behaviour of the engine: votes carry no voter
/// identity and are exempt from the one-vote-per-voter rule.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    #[default]
    Public,
    Private,
    Anonymous,
}

impl FromStr for PrivacyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(PrivacyMode::Public),
            "private" => Ok(PrivacyMode::Private),
            "anonymous" => Ok(PrivacyMode::Anonymous),
            x => Err(format!(
                "unknown privacy mode {:?} (expected public, private or anonymous)",
                x
            )),
        }
    }
}

/// The request to create a poll. See [crate::builder::PollSpecBuilder].
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub creator_id: UserId,
    pub ends_at: Option<DateTime<Utc>>,
    pub privacy_mode: PrivacyMode,
    pub region: Option<String>,
    pub topic: Option<String>,
}

/// Changes requested through `set_flags`. Fields left to `None` are unchanged.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagUpdate {
    pub is_active: Option<bool>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// The identity performing a flag change, with the role vouched for by the
/// identity provider.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Actor {
    pub id: UserId,
    pub is_admin: bool,
}

// ********* Stored data structures ***********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    // Fixed at creation.
    pub options: Vec<String>,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub privacy_mode: PrivacyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub is_active: bool,
}

impl Poll {
    pub fn is_anonymous(&self) -> bool {
        self.privacy_mode == PrivacyMode::Anonymous
    }

    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(|s| s.as_str())
    }

    pub fn may_change_flags(&self, actor: &Actor) -> bool {
        actor.is_admin || actor.id == self.creator_id
    }
}

/// A single accepted vote. Never updated nor deleted.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: VoteId,
    pub poll_id: PollId,
    // None for anonymous polls.
    pub voter_id: Option<UserId>,
    pub option_index: usize,
    pub cast_at: DateTime<Utc>,
}

// ******** Output data structures *********

/// The aggregated result of a poll at a given instant.
///
/// `counts` and `percentages` always have one entry per poll option.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyResult {
    pub poll_id: PollId,
    pub counts: Vec<u64>,
    pub total_votes: u64,
    pub percentages: Vec<u32>,
    pub winners: BTreeSet<usize>,
    pub computed_at: DateTime<Utc>,
}

impl TallyResult {
    /// More than one option shares the highest count.
    pub fn is_tie(&self) -> bool {
        self.winners.len() > 1
    }

    /// The labels of the winning options, in option order.
    pub fn leaders<'a>(&self, poll: &'a Poll) -> Vec<&'a str> {
        self.winners
            .iter()
            .filter_map(|idx| poll.option(*idx))
            .collect()
    }
}

/// Temporal state of a poll. `Ended` is terminal.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Ended,
}

/// How a poll is classified in the archive.
///
/// `Expired` polls reached their end time, `Completed` polls were switched off
/// before any end time (or never had one).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Active,
    Expired,
    Completed,
}

impl Outcome {
    pub fn state(&self) -> LifecycleState {
        match self {
            Outcome::Active => LifecycleState::Active,
            Outcome::Expired | Outcome::Completed => LifecycleState::Ended,
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Outcome::Active),
            "expired" => Ok(Outcome::Expired),
            "completed" => Ok(Outcome::Completed),
            x => Err(format!(
                "unknown outcome {:?} (expected active, expired or completed)",
                x
            )),
        }
    }
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    pub max_options: usize,
    pub max_title_length: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArchiveSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Users allowed to change the flags of any poll.
    pub admins: Vec<UserId>,
    pub limits: Limits,
    pub archive: ArchiveSettings,
}

impl EngineConfig {
    pub const DEFAULT: EngineConfig = EngineConfig {
        admins: Vec::new(),
        limits: Limits {
            max_options: 64,
            max_title_length: 200,
        },
        archive: ArchiveSettings {
            default_page_size: 20,
            max_page_size: 100,
        },
    };

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.iter().any(|a| a == user)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::DEFAULT
    }
}
