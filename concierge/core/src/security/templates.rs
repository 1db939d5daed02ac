//! Policy notice templates
//!
//! Every user-visible notice the client writes on its own (guard refusals,
//! rate-limit waits, safety replacements, unavailability fallbacks) comes from
//! this table, keyed by locale, audience and notice. Entries without an
//! audience apply to both surfaces; an audience-specific entry wins when
//! present. Placeholders are written `{name}` and filled by [`render`].

use serde::{Deserialize, Serialize};

use self::NoticeKey as K;
use crate::messages::Audience::{AdminDev, PublicFront};
use crate::messages::Locale::{En, Ka};
use crate::messages::{Audience, Locale};

/// Which notice to render
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKey {
    /// Input touched a denylisted term
    GuardDenylist,
    /// Public input outside the consumer topics
    GuardOffTopic,
    /// Input tried to extract secrets
    GuardSecrets,
    /// Input asked for a privileged operation
    GuardPrivileged,
    /// Input carried executable or injection content
    GuardDangerous,
    /// Input exceeded the length cap
    GuardTooLong,
    /// Cooldown in effect; `{seconds}`
    RateLimited,
    /// Backend rejected the caller's credentials
    AuthRequired,
    /// Backend rejected the request itself
    ClientFailure,
    /// The exchange produced nothing to show
    NoResponse,
    /// Reply replaced because it looked dangerous
    SafetyNotice,
    /// Backend unreachable; `{retry}`
    Unavailable,
}

struct TemplateEntry {
    locale: Locale,
    audience: Option<Audience>,
    key: NoticeKey,
    text: &'static str,
}

const fn entry(
    locale: Locale,
    audience: Option<Audience>,
    key: NoticeKey,
    text: &'static str,
) -> TemplateEntry {
    TemplateEntry {
        locale,
        audience,
        key,
        text,
    }
}

static TEMPLATES: &[TemplateEntry] = &[
    // English
    entry(En, None, K::GuardDenylist, "I can't share passwords, keys, credentials or internal system details. I'm happy to help with cottages, hotels, vehicle rentals and your bookings."),
    entry(En, None, K::GuardSecrets, "I can't share passwords, keys or other credentials."),
    entry(En, None, K::GuardPrivileged, "That action can't be performed from the chat. Administrative operations are only available in the management panel."),
    entry(En, None, K::GuardDangerous, "I can't help with that request."),
    entry(En, Some(PublicFront), K::GuardOffTopic, "I can only help with cottages, hotels, vehicle rentals and your bookings. What would you like to know about your stay?"),
    entry(En, None, K::GuardOffTopic, "That request is outside what this assistant handles."),
    entry(En, None, K::GuardTooLong, "Your message is too long. Please shorten it to {max} characters and try again."),
    entry(En, Some(AdminDev), K::GuardDenylist, "Blocked by input guard (denylist). Credentials and internal details are never exposed through the assistant."),
    entry(En, Some(AdminDev), K::GuardSecrets, "Blocked by input guard (secrets). Credentials are never exposed through the assistant."),
    entry(En, Some(AdminDev), K::GuardPrivileged, "Blocked by input guard (privileged). Use the management panel for administrative operations."),
    entry(En, Some(AdminDev), K::GuardDangerous, "Blocked by input guard (dangerous)."),
    entry(En, None, K::RateLimited, "Please wait {seconds} seconds before sending another message."),
    entry(En, None, K::AuthRequired, "Please sign in to continue this conversation."),
    entry(En, Some(AdminDev), K::AuthRequired, "The assistant endpoint rejected the request credentials (HTTP {status}). Sign in again."),
    entry(En, None, K::ClientFailure, "I couldn't process that request. Please rephrase it and try again."),
    entry(En, Some(AdminDev), K::ClientFailure, "The assistant endpoint rejected the request (HTTP {status})."),
    entry(En, None, K::NoResponse, "I didn't receive a response. Please try again."),
    entry(En, None, K::SafetyNotice, "This response was withheld for safety reasons. Please ask about your stay, booking or rental."),
    entry(En, Some(PublicFront), K::Unavailable, "The assistant is temporarily unavailable. Please try again in {retry} seconds."),
    entry(En, Some(AdminDev), K::Unavailable, "Assistant unavailable [{code}] status: {status}, latency: {latency_ms} ms, endpoint: {endpoint}. Retry in {retry} s."),
    // Georgian
    entry(Ka, None, K::GuardDenylist, "პაროლების, გასაღებების, მონაცემების ან სისტემის შიდა დეტალების გაზიარება არ შემიძლია. სიამოვნებით დაგეხმარებით კოტეჯების, სასტუმროების, ავტომობილების ქირაობისა და ჯავშნების საკითხებში."),
    entry(Ka, None, K::GuardSecrets, "პაროლების, გასაღებების ან სხვა მონაცემების გაზიარება არ შემიძლია."),
    entry(Ka, None, K::GuardPrivileged, "ამ მოქმედების შესრულება ჩატიდან შეუძლებელია. ადმინისტრაციული ოპერაციები მხოლოდ მართვის პანელიდან ხორციელდება."),
    entry(Ka, None, K::GuardDangerous, "ამ მოთხოვნაში ვერ დაგეხმარებით."),
    entry(Ka, Some(PublicFront), K::GuardOffTopic, "შემიძლია დაგეხმაროთ მხოლოდ კოტეჯების, სასტუმროების, ავტომობილების ქირაობისა და ჯავშნების საკითხებში. რისი გაგება გსურთ?"),
    entry(Ka, None, K::GuardOffTopic, "ეს მოთხოვნა ასისტენტის კომპეტენციის მიღმაა."),
    entry(Ka, None, K::GuardTooLong, "შეტყობინება ძალიან გრძელია. გთხოვთ, შეამოკლოთ {max} სიმბოლომდე და სცადოთ თავიდან."),
    entry(Ka, Some(AdminDev), K::GuardDenylist, "დაბლოკილია შემავალი ფილტრით (denylist). მონაცემები და შიდა დეტალები ასისტენტით არასდროს გაიცემა."),
    entry(Ka, Some(AdminDev), K::GuardSecrets, "დაბლოკილია შემავალი ფილტრით (secrets). მონაცემები ასისტენტით არასდროს გაიცემა."),
    entry(Ka, Some(AdminDev), K::GuardPrivileged, "დაბლოკილია შემავალი ფილტრით (privileged). ადმინისტრაციული ოპერაციებისთვის გამოიყენეთ მართვის პანელი."),
    entry(Ka, Some(AdminDev), K::GuardDangerous, "დაბლოკილია შემავალი ფილტრით (dangerous)."),
    entry(Ka, None, K::RateLimited, "გთხოვთ, დაელოდოთ {seconds} წამს შემდეგ შეტყობინებამდე."),
    entry(Ka, None, K::AuthRequired, "საუბრის გასაგრძელებლად გთხოვთ, გაიაროთ ავტორიზაცია."),
    entry(Ka, Some(AdminDev), K::AuthRequired, "ასისტენტის სერვისმა უარყო მოთხოვნის ავტორიზაცია (HTTP {status}). გაიარეთ ავტორიზაცია თავიდან."),
    entry(Ka, None, K::ClientFailure, "მოთხოვნის დამუშავება ვერ მოხერხდა. გთხოვთ, შეცვალოთ ფორმულირება და სცადოთ თავიდან."),
    entry(Ka, Some(AdminDev), K::ClientFailure, "ასისტენტის სერვისმა უარყო მოთხოვნა (HTTP {status})."),
    entry(Ka, None, K::NoResponse, "პასუხი ვერ მივიღეთ. გთხოვთ, სცადოთ თავიდან."),
    entry(Ka, None, K::SafetyNotice, "პასუხი დაიმალა უსაფრთხოების მიზეზით. გთხოვთ, იკითხოთ თქვენი დასვენების, ჯავშნის ან ქირაობის შესახებ."),
    entry(Ka, Some(PublicFront), K::Unavailable, "ასისტენტი დროებით მიუწვდომელია. გთხოვთ, სცადოთ {retry} წამში."),
    entry(Ka, Some(AdminDev), K::Unavailable, "ასისტენტი მიუწვდომელია [{code}] სტატუსი: {status}, დაყოვნება: {latency_ms} ms, endpoint: {endpoint}. ხელახლა ცდა {retry} წამში."),
];

fn lookup(locale: Locale, audience: Audience, key: NoticeKey) -> Option<&'static str> {
    let find = |locale: Locale, audience: Option<Audience>| {
        TEMPLATES
            .iter()
            .find(|e| e.locale == locale && e.audience == audience && e.key == key)
            .map(|e| e.text)
    };
    find(locale, Some(audience))
        .or_else(|| find(locale, None))
        .or_else(|| find(En, Some(audience)))
        .or_else(|| find(En, None))
}

/// Render a notice, substituting `{name}` placeholders from `args`
///
/// Lookup prefers the exact audience, then the audience-neutral entry, then
/// the English equivalents. Unknown placeholders are left as written.
#[must_use]
pub fn render(key: NoticeKey, locale: Locale, audience: Audience, args: &[(&str, String)]) -> String {
    let Some(template) = lookup(locale, audience, key) else {
        return String::new();
    };
    args.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: &[NoticeKey] = &[
        K::GuardDenylist,
        K::GuardOffTopic,
        K::GuardSecrets,
        K::GuardPrivileged,
        K::GuardDangerous,
        K::GuardTooLong,
        K::RateLimited,
        K::AuthRequired,
        K::ClientFailure,
        K::NoResponse,
        K::SafetyNotice,
        K::Unavailable,
    ];

    #[test]
    fn test_every_key_renders_for_every_surface() {
        for key in ALL_KEYS {
            for locale in [En, Ka] {
                for audience in [PublicFront, AdminDev] {
                    assert!(
                        !render(*key, locale, audience, &[]).is_empty(),
                        "missing {key:?} for {locale}/{audience}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_placeholder_substitution() {
        let text = render(K::RateLimited, En, PublicFront, &[("seconds", "3".to_string())]);
        assert_eq!(text, "Please wait 3 seconds before sending another message.");
        let text = render(K::RateLimited, Ka, PublicFront, &[("seconds", "25".to_string())]);
        assert!(text.contains("25"));
    }

    #[test]
    fn test_audience_specific_entry_wins() {
        let public = render(K::Unavailable, En, PublicFront, &[("retry", "5".to_string())]);
        let admin = render(
            K::Unavailable,
            En,
            AdminDev,
            &[
                ("code", "NETWORK".to_string()),
                ("status", "n/a".to_string()),
                ("latency_ms", "120".to_string()),
                ("endpoint", "http://localhost:9/chat".to_string()),
                ("retry", "5".to_string()),
            ],
        );
        assert!(!public.contains("NETWORK"));
        assert!(admin.contains("[NETWORK]"));
        assert!(admin.contains("http://localhost:9/chat"));
    }

    #[test]
    fn test_notices_localized() {
        assert_ne!(
            render(K::SafetyNotice, En, PublicFront, &[]),
            render(K::SafetyNotice, Ka, PublicFront, &[])
        );
    }
}
