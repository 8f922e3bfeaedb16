//! Rules module - Per-challenge heuristic scoring
//!
//! Each known challenge owns one rule: a pure function from snippet text to
//! a score band and feedback. The engine maps bands to status and points
//! using the configured scoring policy.
//!
//! The rules module does NOT:
//! - Run external tools or the sandbox
//! - Persist anything
//! - Parse Python (matching is pattern based)

pub mod cmdi;
pub mod sqli;
pub mod xss;

use regex::Regex;
use tracing::error;

use crate::config::ScoringConfig;
use crate::core::{ScoringResult, SubmissionStatus};

pub use cmdi::CommandInjectionRule;
pub use sqli::SqlInjectionRule;
pub use xss::CrossSiteScriptingRule;

/// Challenges with a scoring rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Challenge {
    SqlInjection,
    CrossSiteScripting,
    CommandInjection,
}

impl Challenge {
    pub const ALL: [Challenge; 3] = [
        Challenge::SqlInjection,
        Challenge::CrossSiteScripting,
        Challenge::CommandInjection,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Challenge::SqlInjection => "sqli_001",
            Challenge::CrossSiteScripting => "xss_001",
            Challenge::CommandInjection => "cmdi_001",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == slug)
    }
}

/// Conceptual score tier produced by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Safe pattern present and no unsafe pattern
    Full,
    /// Safe primitive used, unsafe residue remains
    Partial,
    /// No safe pattern detected
    Zero,
}

/// A rule's judgement before the policy assigns points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub band: Band,
    pub feedback: String,
}

impl Verdict {
    pub fn new(band: Band, feedback: impl Into<String>) -> Self {
        Self {
            band,
            feedback: feedback.into(),
        }
    }

    /// Shared band selection: safe and unsafe signals decide the tier
    pub(crate) fn from_signals(
        safe: bool,
        risky: bool,
        full: &str,
        partial: &str,
        unsafe_only: &str,
        missing: &str,
    ) -> Self {
        match (safe, risky) {
            (true, false) => Self::new(Band::Full, full),
            (true, true) => Self::new(Band::Partial, partial),
            (false, true) => Self::new(Band::Zero, unsafe_only),
            (false, false) => Self::new(Band::Zero, missing),
        }
    }
}

/// Regexes matched against the whole snippet; any match counts
pub(crate) struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile `sources`; a pattern that fails to compile is logged and dropped
    pub(crate) fn new(sources: &[&str]) -> Self {
        let patterns = sources
            .iter()
            .filter_map(|src| match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!("Invalid rule pattern {}: {}", src, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub(crate) fn is_match(&self, code: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(code))
    }

    /// Byte offsets just past every match of every pattern
    pub(crate) fn match_ends<'a>(&'a self, code: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.patterns
            .iter()
            .flat_map(move |re| re.find_iter(code).map(|m| m.end()))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.patterns.len()
    }
}

/// Registry of challenge rules
pub struct RuleEngine {
    policy: ScoringConfig,
    sqli: SqlInjectionRule,
    xss: CrossSiteScriptingRule,
    cmdi: CommandInjectionRule,
}

impl RuleEngine {
    pub fn new(policy: ScoringConfig) -> Self {
        Self {
            policy,
            sqli: SqlInjectionRule::new(),
            xss: CrossSiteScriptingRule::new(),
            cmdi: CommandInjectionRule::new(),
        }
    }

    /// Score `code` for `slug`. Unknown slugs stay pending with no score.
    pub fn evaluate(&self, slug: &str, code: &str) -> ScoringResult {
        let Some(challenge) = Challenge::from_slug(slug) else {
            return ScoringResult {
                status: SubmissionStatus::Pending,
                score: None,
                feedback: Some(format!(
                    "No scoring rule exists yet for challenge '{}'.",
                    slug
                )),
                issues: Vec::new(),
            };
        };

        let verdict = match challenge {
            Challenge::SqlInjection => self.sqli.evaluate(code),
            Challenge::CrossSiteScripting => self.xss.evaluate(code),
            Challenge::CommandInjection => self.cmdi.evaluate(code),
        };
        self.grade(verdict)
    }

    fn grade(&self, verdict: Verdict) -> ScoringResult {
        let (status, score) = match verdict.band {
            Band::Full => (SubmissionStatus::Passed, self.policy.full_score),
            Band::Partial => (SubmissionStatus::Failed, self.policy.partial_score),
            Band::Zero => (SubmissionStatus::Failed, self.policy.zero_score),
        };
        ScoringResult::graded(status, score, verdict.feedback)
    }
}
