/*!
Vote recording, tallying and lifecycle engine for civic polls.

The engine is made of five parts, leaf first:

- [store::PollStore] keeps the poll definitions,
- [ledger::VoteLedger] records votes and enforces one vote per voter,
- [tally::TallyEngine] turns the votes of a poll into a [TallyResult],
- [lifecycle::LifecycleManager] tells whether a poll is still running,
- [archive::ArchiveQueryService] searches through past and current polls.

[PollService] wires them together behind the API used by the display layer.

```
use std::sync::Arc;
use poll_engine::builder::PollSpecBuilder;
use poll_engine::lifecycle::SystemClock;
use poll_engine::{EngineConfig, PollService, UserId};

let service = PollService::new(EngineConfig::DEFAULT, Arc::new(SystemClock));
let poll = service.create_poll(
    PollSpecBuilder::new("Where should the new bus stop go?", "alice")
        .options(&["Elm Street", "Oak Avenue"])
        .build(),
)?;
service.cast_vote(poll.id, 1, Some(UserId::from("bob")))?;
let results = service.get_results(poll.id)?;
assert_eq!(results.counts, vec![0, 1]);
assert_eq!(results.percentages, vec![0, 100]);
# Ok::<(), poll_engine::PollError>(())
```
*/

mod config;
mod error;

pub mod archive;
pub mod builder;
pub mod ledger;
pub mod lifecycle;
pub mod manual;
pub mod service;
pub mod store;
pub mod tally;

pub use crate::config::*;
pub use crate::error::{PollError, PollResult};
pub use crate::service::{PollService, Snapshot};
