use chrono::{DateTime, Utc};

pub use crate::config::*;

/// A builder for poll creation requests.
///
/// ```
/// use poll_engine::builder::PollSpecBuilder;
/// use poll_engine::PrivacyMode;
///
/// let spec = PollSpecBuilder::new("Extend the library opening hours?", "alice")
///     .options(&["Yes", "No"])
///     .option("Only on weekends")
///     .region("Northside")
///     .privacy(PrivacyMode::Anonymous)
///     .build();
///
/// assert_eq!(spec.options.len(), 3);
/// assert_eq!(spec.creator_id.as_str(), "alice");
/// ```
pub struct PollSpecBuilder {
    spec: PollSpec,
}

impl PollSpecBuilder {
    pub fn new(title: &str, creator: &str) -> PollSpecBuilder {
        PollSpecBuilder {
            spec: PollSpec {
                title: title.to_string(),
                description: None,
                options: Vec::new(),
                creator_id: UserId::from(creator),
                ends_at: None,
                privacy_mode: PrivacyMode::Public,
                region: None,
                topic: None,
            },
        }
    }

    /// Appends one option. Options keep the order in which they are added.
    pub fn option(mut self, label: &str) -> PollSpecBuilder {
        self.spec.options.push(label.to_string());
        self
    }

    pub fn options(mut self, labels: &[&str]) -> PollSpecBuilder {
        self.spec
            .options
            .extend(labels.iter().map(|s| s.to_string()));
        self
    }

    pub fn description(mut self, description: &str) -> PollSpecBuilder {
        self.spec.description = Some(description.to_string());
        self
    }

    pub fn ends_at(mut self, ends_at: DateTime<Utc>) -> PollSpecBuilder {
        self.spec.ends_at = Some(ends_at);
        self
    }

    pub fn privacy(mut self, mode: PrivacyMode) -> PollSpecBuilder {
        self.spec.privacy_mode = mode;
        self
    }

    pub fn region(mut self, region: &str) -> PollSpecBuilder {
        self.spec.region = Some(region.to_string());
        self
    }

    pub fn topic(mut self, topic: &str) -> PollSpecBuilder {
        self.spec.topic = Some(topic.to_string());
        self
    }

    /// Returns the request. Validation happens when the poll is created.
    pub fn build(self) -> PollSpec {
        self.spec
    }
}
