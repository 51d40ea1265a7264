use log::{debug, info, warn};

use poll_engine::archive::{ArchiveFilters, ArchivePage, Page};
use poll_engine::lifecycle::{Clock, ManualClock, SystemClock};
use poll_engine::*;
use snafu::{prelude::*, Snafu};

use std::sync::Arc;

use serde_json::json;
use serde_json::Value as JSValue;

use crate::args::{Args, Command};
use crate::pollctl::config_reader::*;

pub mod config_reader;
pub mod io_common;
pub mod io_data;

pub const DEFAULT_DATA_FILE: &str = "polls.json";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the output"))]
    SerializingJson { source: serde_json::Error },

    #[snafu(display("{source}"))]
    Engine { source: PollError },
}

pub type CliResult<T> = Result<T, CliError>;

/// Exit status when a vote is refused because the poll is closed or the voter
/// already voted. Distinct from the status 2 used by clap for usage errors.
pub const EXIT_REFUSED: i32 = 3;
pub const EXIT_FAILURE: i32 = 1;

pub fn exit_code(e: &CliError) -> i32 {
    match e {
        CliError::Engine { source } if source.is_recoverable() => EXIT_REFUSED,
        _ => EXIT_FAILURE,
    }
}

fn poll_to_json(poll: &Poll, outcome: Outcome) -> JSValue {
    json!({
        "id": poll.id,
        "title": poll.title,
        "description": poll.description,
        "options": poll.options,
        "creatorId": poll.creator_id,
        "createdAt": poll.created_at,
        "endsAt": poll.ends_at,
        "privacyMode": poll.privacy_mode,
        "region": poll.region,
        "topic": poll.topic,
        "isActive": poll.is_active,
        "outcome": outcome,
    })
}

fn results_to_json(poll: &Poll, outcome: Outcome, tally: &TallyResult) -> JSValue {
    let mut options: Vec<JSValue> = Vec::new();
    for (idx, label) in poll.options.iter().enumerate() {
        options.push(json!({
            "index": idx,
            "label": label,
            "count": tally.counts.get(idx).cloned().unwrap_or(0),
            "percentage": tally.percentages.get(idx).cloned().unwrap_or(0),
            "winner": tally.winners.contains(&idx),
        }));
    }
    json!({
        "pollId": poll.id,
        "title": poll.title,
        "outcome": outcome,
        "totalVotes": tally.total_votes,
        "options": options,
        "winners": tally.leaders(poll),
        "tie": tally.is_tie(),
        "computedAt": tally.computed_at,
    })
}

fn archive_to_json(page: &ArchivePage) -> JSValue {
    let entries: Vec<JSValue> = page
        .entries
        .iter()
        .map(|e| {
            json!({
                "poll": poll_to_json(&e.poll, e.outcome),
                "results": results_to_json(&e.poll, e.outcome, &e.tally),
            })
        })
        .collect();
    json!({
        "page": page.page,
        "perPage": page.per_page,
        "totalMatches": page.total_matches,
        "totalPages": page.total_pages,
        "entries": entries,
    })
}

/// Runs one command against the service. Returns the JSON output and whether the
/// data changed.
fn run_command(service: &PollService, command: &Command) -> CliResult<(JSValue, bool)> {
    match command {
        Command::Create {
            title,
            options,
            description,
            ends_at,
            privacy,
            region,
            topic,
            creator,
        } => {
            let spec = PollSpec {
                title: title.clone(),
                description: description.clone(),
                options: options.clone(),
                creator_id: UserId::from(creator.as_str()),
                ends_at: *ends_at,
                privacy_mode: *privacy,
                region: region.clone(),
                topic: topic.clone(),
            };
            let poll = service.create_poll(spec).context(EngineSnafu)?;
            let outcome = service.lifecycle().outcome(&poll);
            Ok((poll_to_json(&poll, outcome), true))
        }
        Command::Vote {
            poll,
            option,
            voter,
        } => {
            let voter_id = voter.as_ref().map(|v| UserId::from(v.as_str()));
            let record = service
                .cast_vote(PollId(*poll), *option, voter_id)
                .context(EngineSnafu)?;
            Ok((json!(record), true))
        }
        Command::Results { poll } => {
            let p = service.get_poll(PollId(*poll)).context(EngineSnafu)?;
            let outcome = service.lifecycle().outcome(&p);
            let tally = service.get_results(p.id).context(EngineSnafu)?;
            Ok((results_to_json(&p, outcome, &tally), false))
        }
        Command::Archive {
            search,
            region,
            topic,
            outcome,
            from,
            to,
            page,
            per_page,
        } => {
            let filters = ArchiveFilters {
                search_text: search.clone(),
                region: region.clone(),
                topic: topic.clone(),
                outcome: *outcome,
                date_from: *from,
                date_to: *to,
            };
            let page = Page {
                number: *page,
                per_page: *per_page,
            };
            let res = service
                .query_archive(&filters, &page)
                .context(EngineSnafu)?;
            Ok((archive_to_json(&res), false))
        }
        Command::SetFlags {
            poll,
            actor,
            active,
            ends_at,
        } => {
            let update = FlagUpdate {
                is_active: *active,
                ends_at: *ends_at,
            };
            if update == FlagUpdate::default() {
                warn!("set-flags: nothing to change for poll {}", poll);
            }
            let p = service
                .set_flags(PollId(*poll), &update, &UserId::from(actor.as_str()))
                .context(EngineSnafu)?;
            let outcome = service.lifecycle().outcome(&p);
            Ok((poll_to_json(&p, outcome), true))
        }
        Command::Audit { poll } => {
            let poll_id = PollId(*poll);
            let digest = service.audit_digest(poll_id).context(EngineSnafu)?;
            let votes = service.votes(poll_id).context(EngineSnafu)?;
            Ok((
                json!({
                    "pollId": poll_id,
                    "votes": votes.snapshot_len(),
                    "digest": digest,
                }),
                false,
            ))
        }
    }
}

pub fn run(args: &Args) -> CliResult<String> {
    let app_config = match &args.config {
        Some(path) => read_config(path)?,
        None => AppConfig::default(),
    };
    debug!("config: {:?}", app_config);
    let data_path = args
        .data
        .clone()
        .or_else(|| app_config.data_file.clone())
        .unwrap_or_else(|| DEFAULT_DATA_FILE.to_string());

    let clock: Arc<dyn Clock> = match args.now {
        Some(at) => {
            info!("Running at fixed time {}", at);
            Arc::new(ManualClock::new(at))
        }
        None => Arc::new(SystemClock),
    };

    let snapshot = io_data::read_snapshot(&data_path)?;
    let service = PollService::from_snapshot(app_config.engine_config(), clock, snapshot)
        .context(EngineSnafu)?;

    let (output, changed) = run_command(&service, &args.command)?;
    if changed {
        let snapshot = service.snapshot().context(EngineSnafu)?;
        io_data::write_snapshot(&data_path, &snapshot)?;
    }
    serde_json::to_string_pretty(&output).context(SerializingJsonSnafu)
}
