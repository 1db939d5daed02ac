//! Chat Message Model
//!
//! Types shared by every layer of the client: the transcript message, its
//! localized structured content, and the tags (locale, audience) that steer
//! guard and sanitizer behaviour.
//!
//! # Structured vs plain content
//!
//! The backend answers either with titled sections (structured content) or a
//! flat text block. [`ReplyBody`] models that duality as a tagged union and
//! [`ReplyBody::plain_text`] can always produce text from either side, so
//! renderers never need to sniff the shape of a payload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Guest or operator input
    User,
    /// The assistant (including client-side policy notices)
    Assistant,
    /// System message
    System,
}

/// Final outcome attached to a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Delivered or answered normally
    Success,
    /// Blocked, rate limited, or failed
    Error,
}

/// Content type hint for rendering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text
    #[default]
    Text,
    /// Sectioned content, rendered as markdown
    Markdown,
}

/// Display language of a message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Georgian
    #[default]
    Ka,
    /// English
    En,
}

impl Locale {
    /// Wire/config name of the locale
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ka => "ka",
            Self::En => "en",
        }
    }

    /// Parse a locale tag (`ka`, `en`, case-insensitive, region suffix ignored)
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let lang = value.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match lang.as_str() {
            "ka" | "ge" => Some(Self::Ka),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which chat surface the client is deployed behind
///
/// Fixed per deployment. Governs guard strictness and whether sectioned content
/// may ever reach the transcript unflattened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Restricted guest-facing chat on the public site
    #[default]
    PublicFront,
    /// Internal/administrative surface
    AdminDev,
}

impl Audience {
    /// Wire/config name of the audience
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicFront => "public_front",
            Self::AdminDev => "admin_dev",
        }
    }

    /// Parse an audience tag
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "public_front" | "public" => Some(Self::PublicFront),
            "admin_dev" | "admin" => Some(Self::AdminDev),
            _ => None,
        }
    }

    /// Whether this is the restricted public surface
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Self::PublicFront)
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One titled section of a structured reply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Section heading (may be empty)
    pub title: String,
    /// Bullet points in display order
    pub bullets: Vec<String>,
    /// Call to action (may be empty)
    pub cta: String,
}

impl ChatSection {
    /// Section holding a single untitled text block
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            bullets: vec![body.into()],
            cta: String::new(),
        }
    }

    /// True when title, bullets and cta carry nothing visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.cta.trim().is_empty()
            && self.bullets.iter().all(|b| b.trim().is_empty())
    }

    /// Plain-text rendering: title, bullets and cta as blank-line separated blocks
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.bullets.len() + 2);
        if !self.title.trim().is_empty() {
            parts.push(self.title.trim());
        }
        parts.extend(
            self.bullets
                .iter()
                .map(|b| b.trim())
                .filter(|b| !b.is_empty()),
        );
        if !self.cta.trim().is_empty() {
            parts.push(self.cta.trim());
        }
        parts.join("\n\n")
    }
}

/// One localized rendering of a reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStructuredContent {
    /// Language of this rendering
    pub language: Locale,
    /// Sections in display order
    pub sections: Vec<ChatSection>,
}

impl ChatStructuredContent {
    /// Build a rendering, dropping empty sections
    #[must_use]
    pub fn new(language: Locale, sections: Vec<ChatSection>) -> Self {
        Self {
            language,
            sections: normalize_sections(sections),
        }
    }

    /// Plain-text rendering of all sections
    #[must_use]
    pub fn plain_text(&self) -> String {
        sections_plain_text(&self.sections)
    }
}

/// Aggregated reply body, either sectioned or flat
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyBody {
    /// Sectioned content as delivered by the backend
    Structured {
        /// Sections in display order
        sections: Vec<ChatSection>,
    },
    /// Flat text
    Text {
        /// The text
        body: String,
    },
}

impl ReplyBody {
    /// Flat text body
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Sectioned body (empty sections dropped)
    #[must_use]
    pub fn structured(sections: Vec<ChatSection>) -> Self {
        Self::Structured {
            sections: normalize_sections(sections),
        }
    }

    /// Plain-text rendering of either variant
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Structured { sections } => sections_plain_text(sections),
            Self::Text { body } => body.trim().to_string(),
        }
    }

    /// Sections for this body; text is split on blank lines into bullets
    #[must_use]
    pub fn sections(&self) -> Vec<ChatSection> {
        match self {
            Self::Structured { sections } => normalize_sections(sections.clone()),
            Self::Text { body } => sections_from_text(body),
        }
    }

    /// Whether the backend delivered genuinely sectioned content
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured { .. })
    }

    /// True when there is nothing visible to render
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plain_text().is_empty()
    }
}

/// Drop sections with nothing visible and trim what remains
#[must_use]
pub fn normalize_sections(sections: Vec<ChatSection>) -> Vec<ChatSection> {
    sections
        .into_iter()
        .map(|s| ChatSection {
            title: s.title.trim().to_string(),
            bullets: s
                .bullets
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            cta: s.cta.trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split text on blank lines into bullet candidates of one untitled section
#[must_use]
pub fn sections_from_text(text: &str) -> Vec<ChatSection> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    normalize_sections(vec![ChatSection {
        title: String::new(),
        bullets: paragraphs,
        cta: String::new(),
    }])
}

/// Collapse sections into a single untitled text block without a cta
///
/// Idempotent: flattening already-flattened sections returns them unchanged.
#[must_use]
pub fn flatten_sections(sections: &[ChatSection]) -> Vec<ChatSection> {
    let plain = sections_plain_text(sections);
    if plain.is_empty() {
        Vec::new()
    } else {
        vec![ChatSection::text(plain)]
    }
}

fn sections_plain_text(sections: &[ChatSection]) -> String {
    sections
        .iter()
        .map(ChatSection::plain_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A message in the transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Localized renderings, in order
    pub content: Vec<ChatStructuredContent>,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Outcome, unset while pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    /// Rendering hint
    #[serde(default)]
    pub content_type: ContentType,
}

impl ChatMessage {
    fn with_role(role: MessageRole) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: Vec::new(),
            timestamp: Utc::now(),
            status: None,
            content_type: ContentType::Text,
        }
    }

    /// User-authored text message
    #[must_use]
    pub fn user(text: &str, locale: Locale) -> Self {
        let mut msg = Self::with_role(MessageRole::User);
        msg.set_sections(locale, vec![ChatSection::text(text)], ContentType::Text);
        msg
    }

    /// Assistant-authored plain notice (policy, failure, fallback text)
    #[must_use]
    pub fn notice(text: &str, locale: Locale, status: MessageStatus) -> Self {
        let mut msg = Self::with_role(MessageRole::Assistant);
        msg.set_sections(locale, vec![ChatSection::text(text)], ContentType::Text);
        msg.status = Some(status);
        msg
    }

    /// Empty assistant message awaiting streamed content
    #[must_use]
    pub fn placeholder() -> Self {
        Self::with_role(MessageRole::Assistant)
    }

    /// Replace content with a single rendering
    pub fn set_sections(
        &mut self,
        locale: Locale,
        sections: Vec<ChatSection>,
        content_type: ContentType,
    ) {
        let rendering = ChatStructuredContent::new(locale, sections);
        self.content = if rendering.sections.is_empty() {
            Vec::new()
        } else {
            vec![rendering]
        };
        self.content_type = content_type;
    }

    /// Plain-text rendering of every localized rendering
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .map(ChatStructuredContent::plain_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// True when nothing visible has been set yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|c| c.sections.is_empty())
    }
}
