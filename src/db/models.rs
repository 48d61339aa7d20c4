//! Database models - structs representing content tables (used by sqlx/serde).

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Hero banner singleton.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HeroContent {
    pub id: i64,
    pub title: String,
    pub secondary_title: String,
    pub subtitle: String,
    pub cta_button_text: String,
    pub cta_button_link: String,
}

impl HeroContent {
    /// Copy served when the table is empty or the database is unreachable.
    pub fn fallback() -> Self {
        Self {
            id: 1,
            title: "Find Your Strength".to_string(),
            secondary_title: "Through Change".to_string(),
            subtitle: "Compassionate emotional coaching for women navigating divorce. \
                       Discover clarity, build confidence, and create your path forward."
                .to_string(),
            cta_button_text: "Start Your Journey".to_string(),
            cta_button_link: "https://tidycal.com/dwd/clarity-call".to_string(),
        }
    }
}

/// "Meet Katie" intro singleton.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IntroContent {
    pub id: i64,
    pub heading: String,
    pub body: String,
    pub image_url: Option<String>,
}

impl IntroContent {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            heading: "Meet Katie".to_string(),
            body: "Katie is a compassionate emotional coach dedicated to supporting women \
                   through one of life's most challenging transitions. With her warm, \
                   empathetic approach and deep understanding of the emotional complexities \
                   of divorce, she provides a safe space for healing, growth, and \
                   rediscovering your inner strength."
                .to_string(),
            image_url: None,
        }
    }
}

/// One key→text row of the homepage support section.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SectionContent {
    pub key: String,
    pub content: String,
}

/// A coaching service offering.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Option<String>,
    pub booking_url: String,
    pub icon: Option<String>,
    pub icon_url: Option<String>,
    pub order_num: i32,
    pub visible: bool,
}

/// Icon tags a service may carry. A closed set resolved at compile time;
/// unknown tags are rejected at the API boundary rather than looked up by
/// name at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceIcon {
    Heart,
    Compass,
    Calendar,
    MessageCircle,
    Phone,
    Star,
}

impl ServiceIcon {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceIcon::Heart => "heart",
            ServiceIcon::Compass => "compass",
            ServiceIcon::Calendar => "calendar",
            ServiceIcon::MessageCircle => "message_circle",
            ServiceIcon::Phone => "phone",
            ServiceIcon::Star => "star",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heart" => Some(ServiceIcon::Heart),
            "compass" => Some(ServiceIcon::Compass),
            "calendar" => Some(ServiceIcon::Calendar),
            "message_circle" => Some(ServiceIcon::MessageCircle),
            "phone" => Some(ServiceIcon::Phone),
            "star" => Some(ServiceIcon::Star),
            _ => None,
        }
    }

    /// Glyph used by the server-rendered pages.
    pub const fn glyph(self) -> &'static str {
        match self {
            ServiceIcon::Heart => "\u{2665}",
            ServiceIcon::Compass => "\u{29BE}",
            ServiceIcon::Calendar => "\u{1F4C5}",
            ServiceIcon::MessageCircle => "\u{1F4AC}",
            ServiceIcon::Phone => "\u{260E}",
            ServiceIcon::Star => "\u{2605}",
        }
    }
}

/// A client testimonial; displayed newest first, never reordered by hand.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: i64,
    pub name: String,
    pub text: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Faq {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub order_num: i32,
}

/// Footer contact singleton.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FooterSettings {
    pub id: i64,
    pub email: String,
    pub whatsapp_link: String,
    pub copyright_year: i32,
}

impl FooterSettings {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            email: String::new(),
            whatsapp_link: String::new(),
            copyright_year: Utc::now().year(),
        }
    }
}

/// Where the navigation "Login" button sends visitors.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LoginSettings {
    pub id: i64,
    pub redirect_url: String,
}

impl LoginSettings {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            redirect_url: "https://app.divorcewithdirection.com".to_string(),
        }
    }
}

/// Booking-calendar URL used by the consultation CTA.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CalendarSettings {
    pub id: i64,
    pub booking_url: String,
}

impl CalendarSettings {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            booking_url: "https://tidycal.com/dwd/clarity-call".to_string(),
        }
    }
}

/// Privacy-policy markup singleton. `content` is sanitized on write and
/// rendered unescaped on the public page.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    pub id: i64,
    pub content: String,
}

impl PrivacyPolicy {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            content: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hero_fallback_uses_literal_copy() {
        let hero = HeroContent::fallback();
        assert_eq!(hero.title, "Find Your Strength");
        assert_eq!(hero.secondary_title, "Through Change");
    }

    #[test]
    fn test_service_icon_round_trips_tags() {
        for icon in [
            ServiceIcon::Heart,
            ServiceIcon::Compass,
            ServiceIcon::Calendar,
            ServiceIcon::MessageCircle,
            ServiceIcon::Phone,
            ServiceIcon::Star,
        ] {
            assert_eq!(ServiceIcon::parse(icon.as_str()), Some(icon));
        }
        assert_eq!(ServiceIcon::parse("sparkles"), None);
    }

    #[test]
    fn test_service_icon_serde_matches_as_str() {
        let json = serde_json::to_string(&ServiceIcon::MessageCircle).unwrap();
        assert_eq!(json, "\"message_circle\"");
    }

    #[test]
    fn test_footer_fallback_uses_current_year() {
        let footer = FooterSettings::fallback();
        assert!(footer.copyright_year >= 2024);
    }
}
