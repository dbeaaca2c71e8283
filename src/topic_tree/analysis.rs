//! Topic Analysis: splits a topic string into substrings, hashes each one and
//! records where the wildcard (`+`) and multicard (`#`) substrings sit.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Deepest topic (in substrings) the trees will index.
pub const MAX_TOPIC_DEPTH: usize = 32;

pub const TOPIC_SEPARATOR: char = '/';
pub const WILDCARD: &str = "+";
pub const MULTICARD: &str = "#";

/// First character of a topic living under the reserved system prefix.
pub const SYSTEM_TOPIC_PREFIX: char = '$';

/// Hash of a single substring. Also the whole-topic hash when fed the full string.
pub fn substring_hash(text: &str) -> u32 {
    text.bytes().fold(0u32, |hash, c| {
        (c as u32)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    Publish,
    Subscribe,
    TopicMonitor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAnalysis {
    topic: String,
    ranges: Vec<Range<usize>>,
    hashes: Vec<u32>,
    wildcards: Vec<usize>,
    multicards: Vec<usize>,
    topic_hash: u32,
    sys_topic_end: usize,
}

impl TopicAnalysis {
    pub fn new(topic: &str) -> Result<Self> {
        if topic.is_empty() {
            return Err(EngineError::InvalidTopic("empty topic".to_string()));
        }

        let depth = topic.split(TOPIC_SEPARATOR).count();
        if depth > MAX_TOPIC_DEPTH {
            return Err(EngineError::InvalidTopic(format!(
                "'{}' has {} levels (max {})",
                topic, depth, MAX_TOPIC_DEPTH
            )));
        }

        let mut ranges = Vec::with_capacity(depth);
        let mut hashes = Vec::with_capacity(depth);
        let mut wildcards = Vec::new();
        let mut multicards = Vec::new();

        let mut start = 0;
        for (index, part) in topic.split(TOPIC_SEPARATOR).enumerate() {
            match part {
                WILDCARD => wildcards.push(index),
                MULTICARD => multicards.push(index),
                _ => {}
            }
            ranges.push(start..start + part.len());
            hashes.push(substring_hash(part));
            start += part.len() + TOPIC_SEPARATOR.len_utf8();
        }

        let sys_topic_end = if topic.starts_with(SYSTEM_TOPIC_PREFIX) { 1 } else { 0 };

        Ok(Self {
            topic: topic.to_string(),
            ranges,
            hashes,
            wildcards,
            multicards,
            topic_hash: substring_hash(topic),
            sys_topic_end,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn depth(&self) -> usize {
        self.ranges.len()
    }

    pub fn substring(&self, index: usize) -> &str {
        &self.topic[self.ranges[index].clone()]
    }

    pub fn substring_hash(&self, index: usize) -> u32 {
        self.hashes[index]
    }

    pub fn substrings(&self) -> impl Iterator<Item = &str> + '_ {
        self.ranges.iter().map(move |r| &self.topic[r.clone()])
    }

    pub fn wildcards(&self) -> &[usize] {
        &self.wildcards
    }

    pub fn multicards(&self) -> &[usize] {
        &self.multicards
    }

    pub fn topic_hash(&self) -> u32 {
        self.topic_hash
    }

    /// Index of the first substring past the system prefix (0 for ordinary topics).
    /// Wildcards never match substrings before it.
    pub fn sys_topic_end(&self) -> usize {
        self.sys_topic_end
    }

    pub fn is_system_topic(&self) -> bool {
        self.sys_topic_end != 0
    }

    pub fn has_wildcards(&self) -> bool {
        !self.wildcards.is_empty() || !self.multicards.is_empty()
    }
}

pub fn analyze_topic(topic: &str) -> Result<TopicAnalysis> {
    TopicAnalysis::new(topic)
}

pub fn validate_topic_string(topic: &str, mode: ValidateMode) -> bool {
    let analysis = match TopicAnalysis::new(topic) {
        Ok(analysis) => analysis,
        Err(_) => return false,
    };

    match mode {
        ValidateMode::Publish => !analysis.has_wildcards(),
        ValidateMode::Subscribe => true,
        ValidateMode::TopicMonitor => {
            analysis.wildcards().is_empty() && analysis.multicards() == [analysis.depth() - 1]
        }
    }
}

/// Opaque matcher for regex-style destinations. Compilation lives outside the core.
pub trait TopicPattern: Send + Sync + fmt::Debug {
    fn source(&self) -> &str;
    fn is_match(&self, topic: &str) -> bool;
}

/// A subscription destination: either an analysed topic pattern, indexed by the
/// trees, or a compiled regex matched alongside them.
#[derive(Debug, Clone)]
pub enum Destination {
    Topic(TopicAnalysis),
    Regex(Arc<dyn TopicPattern>),
}

impl Destination {
    pub fn topic(topic: &str) -> Result<Self> {
        Ok(Self::Topic(TopicAnalysis::new(topic)?))
    }

    pub fn is_match(&self, topic: &str) -> bool {
        match self {
            Self::Topic(analysis) => analysis.topic() == topic,
            Self::Regex(pattern) => pattern.is_match(topic),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Topic(analysis) => analysis.topic(),
            Self::Regex(pattern) => pattern.source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_and_hashes_substrings() {
        let analysis = TopicAnalysis::new("sport/tennis/+/#").unwrap();

        assert_eq!(analysis.depth(), 4);
        assert_eq!(analysis.substrings().collect::<Vec<_>>(), vec!["sport", "tennis", "+", "#"]);
        assert_eq!(analysis.wildcards(), &[2]);
        assert_eq!(analysis.multicards(), &[3]);
        assert_eq!(analysis.substring_hash(0), substring_hash("sport"));
        assert_eq!(analysis.topic_hash(), substring_hash("sport/tennis/+/#"));
        assert_eq!(analysis.sys_topic_end(), 0);
    }

    #[test]
    fn test_hash_resets_per_substring() {
        let a = TopicAnalysis::new("x/abc").unwrap();
        let b = TopicAnalysis::new("abc/x").unwrap();
        assert_eq!(a.substring_hash(1), b.substring_hash(0));
        assert_ne!(a.topic_hash(), b.topic_hash());
        assert_eq!(substring_hash(""), 0);
        assert_eq!(substring_hash("a"), 97);
    }

    #[test]
    fn test_empty_levels_are_substrings() {
        let analysis = TopicAnalysis::new("/a//").unwrap();
        assert_eq!(analysis.substrings().collect::<Vec<_>>(), vec!["", "a", "", ""]);
        assert!(matches!(TopicAnalysis::new(""), Err(EngineError::InvalidTopic(_))));
    }

    #[test]
    fn test_only_exact_markers_are_wildcards() {
        let analysis = TopicAnalysis::new("a+/#b/++/+").unwrap();
        assert_eq!(analysis.wildcards(), &[3]);
        assert!(analysis.multicards().is_empty());
    }

    #[test]
    fn test_system_topic_boundary() {
        assert_eq!(TopicAnalysis::new("$SYS/broker/load").unwrap().sys_topic_end(), 1);
        assert_eq!(TopicAnalysis::new("SYS/$broker").unwrap().sys_topic_end(), 0);
        assert!(TopicAnalysis::new("$SYS").unwrap().is_system_topic());
    }

    #[test]
    fn test_depth_limit() {
        let max = vec!["a"; MAX_TOPIC_DEPTH].join("/");
        assert!(TopicAnalysis::new(&max).is_ok());

        let too_deep = vec!["a"; MAX_TOPIC_DEPTH + 1].join("/");
        assert!(matches!(TopicAnalysis::new(&too_deep), Err(EngineError::InvalidTopic(_))));
    }

    #[test]
    fn test_validate_publish_and_subscribe() {
        assert!(validate_topic_string("a/b/c", ValidateMode::Publish));
        assert!(!validate_topic_string("a/+/c", ValidateMode::Publish));
        assert!(!validate_topic_string("a/#", ValidateMode::Publish));
        assert!(validate_topic_string("a/#/b/+", ValidateMode::Subscribe));
        assert!(!validate_topic_string("", ValidateMode::Subscribe));

        let too_deep = vec!["a"; MAX_TOPIC_DEPTH + 1].join("/");
        assert!(!validate_topic_string(&too_deep, ValidateMode::Subscribe));
    }

    #[test]
    fn test_validate_topic_monitor() {
        for valid in ["#", "A/#", "a/b/c/d/e/f/g/#"] {
            assert!(validate_topic_string(valid, ValidateMode::TopicMonitor), "{} should be valid", valid);
        }

        let mut deep = vec!["a"; MAX_TOPIC_DEPTH].join("/");
        deep.push_str("/#");
        for invalid in ["topic/+", "", "a/+/b/#", "a/#/b/#", "a/#/b", "#/a", "/", "A/B", deep.as_str()] {
            assert!(!validate_topic_string(invalid, ValidateMode::TopicMonitor), "{} should be invalid", invalid);
        }
    }

    #[derive(Debug)]
    struct Prefix(String);

    impl TopicPattern for Prefix {
        fn source(&self) -> &str {
            &self.0
        }
        fn is_match(&self, topic: &str) -> bool {
            topic.starts_with(&self.0)
        }
    }

    #[test]
    fn test_regex_destination_bypasses_analysis() {
        let dest = Destination::Regex(Arc::new(Prefix("deep".into())));
        let topic = vec!["deep"; MAX_TOPIC_DEPTH + 5].join("/");
        assert!(dest.is_match(&topic));
        assert_eq!(dest.source(), "deep");
    }
}
