//! Output Sanitizer
//!
//! Post-processes every assistant reply before it reaches the transcript.
//! A reply whose text trips a dangerous-output pattern is replaced wholesale by
//! a localized safety notice. Public-audience replies are flattened to a single
//! untitled block; admin replies keep their sections.
//!
//! Sanitizing is pure. The client decides when a result counts toward the
//! blocked-response telemetry (once, when the message is finalized).

use std::sync::Arc;

use super::rules::RuleTables;
use super::templates::{self, NoticeKey};
use crate::messages::{
    flatten_sections, Audience, ChatSection, ContentType, Locale, MessageStatus, ReplyBody,
};

/// Transcript-ready rendering of a reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedReply {
    /// Sections to store on the message
    pub sections: Vec<ChatSection>,
    /// Rendering hint for the message
    pub content_type: ContentType,
    /// Status the message should carry once final
    pub status: MessageStatus,
    /// True when the reply was replaced by the safety notice
    pub blocked: bool,
}

/// Reply post-processor
#[derive(Clone, Debug)]
pub struct OutputSanitizer {
    rules: Arc<RuleTables>,
}

impl OutputSanitizer {
    /// Create a sanitizer over shared rule tables
    #[must_use]
    pub fn new(rules: Arc<RuleTables>) -> Self {
        Self { rules }
    }

    /// Whether reply text contains dangerous content
    #[must_use]
    pub fn is_dangerous(&self, text: &str) -> bool {
        self.rules.matches_dangerous_output(text)
    }

    /// Produce the transcript rendering of a reply body
    #[must_use]
    pub fn sanitize(&self, body: &ReplyBody, locale: Locale, audience: Audience) -> SanitizedReply {
        if self.is_dangerous(&body.plain_text()) {
            tracing::warn!(audience = %audience, "Reply replaced by safety notice");
            let notice = templates::render(NoticeKey::SafetyNotice, locale, audience, &[]);
            return SanitizedReply {
                sections: vec![ChatSection::text(notice)],
                content_type: ContentType::Text,
                status: MessageStatus::Error,
                blocked: true,
            };
        }

        let sections = body.sections();
        if audience.is_public() {
            return SanitizedReply {
                sections: flatten_sections(&sections),
                content_type: ContentType::Text,
                status: MessageStatus::Success,
                blocked: false,
            };
        }

        let content_type = if body.is_structured() && !sections.is_empty() {
            ContentType::Markdown
        } else {
            ContentType::Text
        };
        SanitizedReply {
            sections,
            content_type,
            status: MessageStatus::Success,
            blocked: false,
        }
    }
}
