//! Security Module
//!
//! Guards both edges of the conversation:
//! - [`TopicGuard`] screens user input before it is sent
//! - [`OutputSanitizer`] screens assistant replies before they are stored
//!
//! Both consult the same compiled [`RuleTables`] and render their notices from
//! the localized [`templates`] table.

pub mod guard;
pub mod rules;
pub mod sanitizer;
pub mod templates;

pub use guard::{GuardBlocked, GuardReason, GuardVerdict, TopicGuard, DEFAULT_MAX_INPUT_CHARS};
pub use rules::{CompiledPattern, RuleCategory, RuleError, RuleTables};
pub use sanitizer::{OutputSanitizer, SanitizedReply};
pub use templates::{render, NoticeKey};
