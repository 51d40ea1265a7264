use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use poll_engine::{Outcome, PrivacyMode};

/// Command line front end of the civic poll engine.
///
/// Every command loads the data file, runs one operation, writes the data file back
/// if the operation changed it, and prints the result in JSON format.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file. See the manual of the poll_engine
    /// crate for the available settings.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, default polls.json) The data file holding the polls and the votes.
    /// Setting this option overrides the path that may be specified in the configuration file.
    #[clap(short, long, value_parser)]
    pub data: Option<String>,

    /// (RFC 3339 timestamp, optional) Runs the command as if the current time was the
    /// given instant. Useful to inspect the archive as it was, or as it will be.
    #[clap(long, value_parser)]
    pub now: Option<DateTime<Utc>>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard error.
    #[clap(long)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates a poll.
    Create {
        #[clap(long, value_parser)]
        title: String,
        /// An option of the poll. Repeat the flag for each option, in display order.
        #[clap(long = "option", value_parser)]
        options: Vec<String>,
        #[clap(long, value_parser)]
        description: Option<String>,
        /// (RFC 3339 timestamp, optional) When the poll stops accepting votes.
        #[clap(long, value_parser)]
        ends_at: Option<DateTime<Utc>>,
        /// public, private or anonymous
        #[clap(long, value_parser, default_value = "public")]
        privacy: PrivacyMode,
        #[clap(long, value_parser)]
        region: Option<String>,
        #[clap(long, value_parser)]
        topic: Option<String>,
        /// The identity of the creator, as given by the identity provider.
        #[clap(long, value_parser)]
        creator: String,
    },
    /// Casts a vote.
    Vote {
        #[clap(long, value_parser)]
        poll: u64,
        /// The index of the chosen option, starting at 0.
        #[clap(long, value_parser)]
        option: usize,
        /// The identity of the voter. Required unless the poll is anonymous.
        #[clap(long, value_parser)]
        voter: Option<String>,
    },
    /// Prints the current results of a poll.
    Results {
        #[clap(long, value_parser)]
        poll: u64,
    },
    /// Searches the polls, newest first.
    Archive {
        /// Case-insensitive text to find in the title, the description or the options.
        #[clap(long, value_parser)]
        search: Option<String>,
        #[clap(long, value_parser)]
        region: Option<String>,
        #[clap(long, value_parser)]
        topic: Option<String>,
        /// active, expired or completed
        #[clap(long, value_parser)]
        outcome: Option<Outcome>,
        /// (RFC 3339 timestamp) Only polls created at or after this instant.
        #[clap(long, value_parser)]
        from: Option<DateTime<Utc>>,
        /// (RFC 3339 timestamp) Only polls created at or before this instant.
        #[clap(long, value_parser)]
        to: Option<DateTime<Utc>>,
        #[clap(long, value_parser, default_value_t = 1)]
        page: usize,
        #[clap(long, value_parser)]
        per_page: Option<usize>,
    },
    /// Switches a poll off or changes its end time. Only for the owner and the admins.
    SetFlags {
        #[clap(long, value_parser)]
        poll: u64,
        #[clap(long, value_parser)]
        actor: String,
        /// true or false. An ended poll cannot be activated again.
        #[clap(long, value_parser)]
        active: Option<bool>,
        #[clap(long, value_parser)]
        ends_at: Option<DateTime<Utc>>,
    },
    /// Prints the audit digest and the number of votes of a poll.
    Audit {
        #[clap(long, value_parser)]
        poll: u64,
    },
}
