//! Rule Tables
//!
//! Static, data-driven pattern sets consulted by the [`TopicGuard`] and the
//! [`OutputSanitizer`]. Every pattern is compiled once, case-insensitively,
//! when the tables are built. Evaluation is a pure function of the text.
//!
//! [`TopicGuard`]: super::TopicGuard
//! [`OutputSanitizer`]: super::OutputSanitizer

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while compiling rule tables
#[derive(Debug, Error)]
pub enum RuleError {
    /// A pattern failed to compile
    #[error("invalid rule pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Regex compiler error
        source: regex::Error,
    },
}

/// Why a dangerous-input pattern fired
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Secret or credential exfiltration
    Secrets,
    /// Privileged or administrative operations
    Privileged,
    /// Command or code execution intent
    Dangerous,
}

/// Terms asking for internal implementation detail, credentials or infrastructure
const DENYLIST: &[&str] = &[
    r"\bapi[\s_-]?keys?\b",
    r"\b(access|auth|bearer|refresh)[\s_-]?tokens?\b",
    r"\bpasswords?\b",
    r"\bcredentials?\b",
    r"\bsecret([\s_-]?keys?)?\b",
    r"\bprivate[\s_-]?keys?\b",
    r"\badmin(istrator)?\b",
    r"/api/\S*",
    r"\b(firebase|firestore|supabase|mongodb|postgres(ql)?)\b",
    r"\b(database|db)[\s_-]?(schema|dump|credentials?|passwords?|url|connection)\b",
    r"\bsystem[\s_-]?prompt\b",
    r"\bsource[\s_-]?code\b",
    r"\benv(ironment)?[\s_-]?(vars?|variables?|file)\b",
    r"\.env\b",
    r"\bservice[\s_-]?account\b",
    r"პაროლ",
    r"ადმინ",
];

const SECRETS_INPUT: &[&str] = &[
    r"\b(show|give|reveal|print|leak|dump|tell|send|share|display|list|expose)\b.*\b(api[\s_-]?keys?|tokens?|passwords?|secrets?|credentials?|private[\s_-]?keys?)\b",
    r"\bapi[\s_-]?keys?\b",
    r"\b(access|auth|bearer|refresh)[\s_-]?tokens?\b",
    r"\bpasswords?\b",
    r"\bcredentials?\b",
    r"\bprivate[\s_-]?keys?\b",
    r"\bsecret[\s_-]?keys?\b",
    r"პაროლ",
];

const PRIVILEGED_INPUT: &[&str] = &[
    r"\badmin(istrator)?\b",
    r"\b(root|sudo|superuser)\b",
    r"/api/\S*.*\b(delete|drop|update|patch|put|post|remove)\b",
    r"\b(delete|drop|wipe|truncate|remove)\b.*\b(all\s+)?(users|bookings|listings|accounts|reservations|database|tables?)\b",
    r"\b(grant|escalate|elevate)\b.*\b(roles?|privileges?|permissions?|access)\b",
    r"\bbypass\b.*\b(auth|login|security|guard|filter)",
    r"ადმინ",
];

const DANGEROUS_INPUT: &[&str] = &[
    r"\brm\s+-rf\b",
    r"\bdrop\s+table\b",
    r"\bunion\s+select\b",
    r"\b(exec|eval|system)\s*\(",
    r"<script\b",
    r"\b(curl|wget)\s+\S+",
    r"\bbash\s+-c\b",
    r"\bpowershell\b",
    r"\$\([^)]*\)",
    r";\s*(rm|shutdown|reboot|cat|chmod)\b",
    r"\b(ignore|disregard)\s+(all\s+)?(previous|prior|above)\s+instructions\b",
];

/// Leaked secrets, privileged endpoints and executable instructions in replies
const DANGEROUS_OUTPUT: &[&str] = &[
    r"```\s*(bash|sh|shell|zsh|powershell|ps1|cmd|bat)\b",
    r"(?s)```.*\b(rm\s+-rf|sudo|curl|wget|chmod|chown|mkfs)\b.*```",
    r"\brm\s+-rf\b",
    r"\bsudo\s+\S+",
    r"\bsk-[a-z0-9_-]{16,}",
    r"\bAIza[0-9a-z_-]{35}\b",
    r"-----BEGIN [a-z ]*PRIVATE KEY-----",
    r"\b(api[_-]?key|secret|password|token)\s*[:=]\s*\S+",
    r"/api/admin\b",
    r"/admin/api\b",
    r"\bfirestore\.googleapis\.com\b",
    r"\bservice[_-]?account\b",
    r"<script\b",
    r"\bdrop\s+table\b",
];

/// Consumer topics the public surface may discuss
const CONSUMER_TOPICS: &[&str] = &[
    r"\b(book(ing|ings|ed)?|reserv(e|ed|ation|ations)|stay(s|ing)?|nights?)\b",
    r"\b(cottages?|hotels?|rooms?|villas?|apartments?|cabins?|guest\s?houses?)\b",
    r"\b(vehicles?|cars?|suvs?|rent(al|als|ing)?|drivers?|transfers?|airport|fuel|mileage|insurance)\b",
    r"\b(prices?|pricing|costs?|rates?|discounts?|deposits?|refunds?|pay(ment|ments|ing)?|cards?)\b",
    r"\b(availab(le|ility)|check[\s-]?in|check[\s-]?out|dates?|calendar|weekends?|holidays?)\b",
    r"\b(guests?|adults?|kids?|child(ren)?|pets?|cancel(led|lation)?)\b",
    r"\b(locations?|address|maps?|directions?|nearby|lake|mountains?|beach|trip|travel|tours?)\b",
    r"\b(amenit(y|ies)|wi-?fi|parking|pool|sauna|breakfast|kitchen|bbq|heating)\b",
    r"\b(reviews?|ratings?|hosts?|owners?|contact|support)\b",
    r"კოტეჯ",
    r"სასტუმრო",
    r"ოთახ",
    r"ჯავშ",
    r"ფას",
    r"ღირ",
    r"მანქან",
    r"ავტომობ",
    r"ქირა",
    r"ქირავ",
    r"თარიღ",
    r"სტუმ",
    r"გაუქმ",
    r"გადახდ",
    r"მისამართ",
    r"აუზ",
    r"საუზმ",
    r"ფასდაკლ",
];

const GREETINGS: &[&str] = &[
    r"^\s*(hi|hello|hey|hiya|howdy|yo|good\s+(morning|afternoon|evening)|thanks?|thank\s+you|bye|goodbye)\b",
    r"^\s*(gamarjoba|madloba|გამარჯობა|გაგიმარჯოს|სალამი|მადლობა|ნახვამდის)",
];

/// Greetings longer than this are treated as ordinary messages
const MAX_GREETING_WORDS: usize = 5;

/// A pre-compiled pattern that keeps its source for display
#[derive(Clone)]
pub struct CompiledPattern {
    /// Pattern source as written in the table
    pub pattern: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compile a pattern case-insensitively
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPattern`] when the regex does not compile.
    pub fn compile(pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(&format!("(?i){pattern}")).map_err(|e| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Test whether the pattern matches anywhere in the text
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .finish()
    }
}

fn compile_all<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Vec<CompiledPattern>, RuleError> {
    patterns.into_iter().map(CompiledPattern::compile).collect()
}

/// Compiled guard and sanitizer rules
#[derive(Clone, Debug)]
pub struct RuleTables {
    denylist: Vec<CompiledPattern>,
    dangerous_input: Vec<(RuleCategory, Vec<CompiledPattern>)>,
    dangerous_output: Vec<CompiledPattern>,
    consumer_topics: Vec<CompiledPattern>,
    greetings: Vec<CompiledPattern>,
}

impl RuleTables {
    /// Compile the built-in tables
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::with_extensions(&[], &[])
    }

    /// Compile the built-in tables plus extra denylist and topic patterns
    ///
    /// # Errors
    ///
    /// Returns an error naming the first pattern that fails to compile.
    pub fn with_extensions(
        extra_denylist: &[String],
        extra_topics: &[String],
    ) -> Result<Self, RuleError> {
        let denylist = compile_all(
            DENYLIST
                .iter()
                .copied()
                .chain(extra_denylist.iter().map(String::as_str)),
        )?;
        let consumer_topics = compile_all(
            CONSUMER_TOPICS
                .iter()
                .copied()
                .chain(extra_topics.iter().map(String::as_str)),
        )?;

        Ok(Self {
            denylist,
            dangerous_input: vec![
                (RuleCategory::Secrets, compile_all(SECRETS_INPUT.iter().copied())?),
                (RuleCategory::Privileged, compile_all(PRIVILEGED_INPUT.iter().copied())?),
                (RuleCategory::Dangerous, compile_all(DANGEROUS_INPUT.iter().copied())?),
            ],
            dangerous_output: compile_all(DANGEROUS_OUTPUT.iter().copied())?,
            consumer_topics,
            greetings: compile_all(GREETINGS.iter().copied())?,
        })
    }

    /// Whether the text contains a denylisted term
    #[must_use]
    pub fn matches_denylist(&self, text: &str) -> bool {
        self.denylist.iter().any(|p| p.is_match(text))
    }

    /// First dangerous-input category whose patterns match, checked in
    /// secrets, privileged, dangerous order
    #[must_use]
    pub fn dangerous_input_category(&self, text: &str) -> Option<RuleCategory> {
        self.dangerous_input
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
            .map(|(category, _)| *category)
    }

    /// Whether reply text contains a dangerous-output pattern
    #[must_use]
    pub fn matches_dangerous_output(&self, text: &str) -> bool {
        self.dangerous_output.iter().any(|p| p.is_match(text))
    }

    /// Whether the text touches an allowlisted consumer topic
    #[must_use]
    pub fn matches_consumer_topic(&self, text: &str) -> bool {
        self.consumer_topics.iter().any(|p| p.is_match(text))
    }

    /// Whether the text is a short greeting or thanks
    #[must_use]
    pub fn is_greeting(&self, text: &str) -> bool {
        text.split_whitespace().count() <= MAX_GREETING_WORDS
            && self.greetings.iter().any(|p| p.is_match(text))
    }
}
