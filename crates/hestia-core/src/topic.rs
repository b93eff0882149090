//! MQTT topics and topic filters
//!
//! Topics are `/`-separated strings passed through the bridge untouched.
//! Filters are the subscription patterns sent to the broker; `+` matches a
//! single level and a trailing `#` matches everything below (and including)
//! its parent level.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BridgeError, Result};

/// Topics the home dashboard listens to
pub const DEFAULT_TOPICS: &[&str] = &[
    "regulator/regulate_radiator",
    "zigbee2mqtt/ts_salon_1",
    "zigbee2mqtt/ts_bureau",
    "zigbee2mqtt/ts_chambre_1",
    "zigbee2mqtt/ts_couloir",
    "external/rad_salon",
    "external/rad_bureau",
    "external/rad_chambre",
    "external/rad_couloir",
];

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Check that a topic can be published to
pub fn validate_publish_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(BridgeError::MalformedEnvelope(
            "topic must not be empty".to_string(),
        ));
    }
    if topic.contains(['+', '#']) {
        return Err(BridgeError::MalformedEnvelope(format!(
            "wildcards are not allowed in publish topic '{}'",
            topic
        )));
    }
    Ok(())
}

/// A validated MQTT subscription filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicFilter(String);

impl TopicFilter {
    /// Parse and validate a filter
    pub fn parse(filter: impl Into<String>) -> Result<Self> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(BridgeError::InvalidTopicFilter(
                "filter must not be empty".to_string(),
            ));
        }

        let levels: Vec<&str> = filter.split('/').collect();
        let last = levels.len() - 1;
        for (i, level) in levels.iter().enumerate() {
            if level.contains('#') && (*level != MULTI_LEVEL || i != last) {
                return Err(BridgeError::InvalidTopicFilter(filter));
            }
            if level.contains('+') && *level != SINGLE_LEVEL {
                return Err(BridgeError::InvalidTopicFilter(filter));
            }
        }

        Ok(Self(filter))
    }

    /// The filter string as sent to the broker
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the filter has no wildcard levels
    pub fn is_exact(&self) -> bool {
        !self.0.contains(['+', '#'])
    }

    /// Check whether a concrete topic matches this filter
    pub fn matches(&self, topic: &str) -> bool {
        if self.is_exact() {
            return self.0 == topic;
        }

        // Wildcards never match the broker's `$` topics at the first level
        if topic.starts_with('$') && self.0.starts_with(['+', '#']) {
            return false;
        }

        let mut topic_levels = topic.split('/');
        for level in self.0.split('/') {
            match level {
                MULTI_LEVEL => return true,
                SINGLE_LEVEL => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                exact => {
                    if topic_levels.next() != Some(exact) {
                        return false;
                    }
                }
            }
        }
        topic_levels.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TopicFilter {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<TopicFilter> for String {
    fn from(filter: TopicFilter) -> Self {
        filter.0
    }
}

/// The filters the bridge subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    filters: Vec<TopicFilter>,
}

impl SubscriptionSet {
    /// Build a set, skipping duplicate filters
    pub fn new(filters: impl IntoIterator<Item = TopicFilter>) -> Self {
        let mut unique: Vec<TopicFilter> = Vec::new();
        for filter in filters {
            if !unique.contains(&filter) {
                unique.push(filter);
            }
        }
        Self { filters: unique }
    }

    /// Parse a list of filter strings
    pub fn parse<I, S>(filters: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filters = filters
            .into_iter()
            .map(TopicFilter::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(filters))
    }

    /// Iterate over the filters
    pub fn iter(&self) -> impl Iterator<Item = &TopicFilter> {
        self.filters.iter()
    }

    /// Number of filters
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True if there are no filters
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Check whether any filter matches the topic
    pub fn matches(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| f.matches(topic))
    }
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new(DEFAULT_TOPICS.iter().map(|t| TopicFilter(t.to_string())))
    }
}
