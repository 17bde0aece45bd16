//! Redaction rules, byte actions and sequence search
//!
//! A [`Rule`] decides whether a file is affected and which byte runs;
//! an [`Action`] rewrites those runs on the image.

pub mod action;
#[cfg(feature = "native-search")]
pub mod native;
pub mod rule;
pub mod search;

pub use action::{fuzz_byte, Action, ActionOutcome, SkippedRun};
#[cfg(feature = "native-search")]
pub use native::NativeSearcher;
pub use rule::{glob_to_regex, Rule, RuleKind};
pub use search::{
    default_searcher, CompiledSearch, Encoding, SearchHit, SearchPattern, SequenceSearcher,
};

/// One entry of the ordered rule list: what to look for and what to do about it.
#[derive(Debug)]
pub struct RuleAction {
    pub rule: Rule,
    pub action: Action,
}

impl RuleAction {
    pub fn new(rule: Rule, action: Action) -> Self {
        Self { rule, action }
    }
}
