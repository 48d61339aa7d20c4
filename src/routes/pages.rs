/**
 * Public Pages
 * Server-rendered HTML for visitors: home, services, privacy and FAQ.
 * Content comes from the content tables with built-in fallback copy, so
 * the pages render sensibly on a fresh or unreachable database.
 */
use axum::{body::Body, http::header, response::Response};
use std::collections::BTreeMap;

use crate::db::{
    self,
    models::{
        CalendarSettings, Faq, FooterSettings, HeroContent, IntroContent, PrivacyPolicy, Service,
        ServiceIcon, Testimonial,
    },
};

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn html_response(body: String) -> Response {
    Response::builder()
        .status(200)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(
            header::CACHE_CONTROL,
            "public, max-age=60, stale-while-revalidate=300",
        )
        .body(Body::from(body))
        .unwrap()
}

fn page_shell(title: &str, main: &str, footer: &FooterSettings) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <meta name="viewport" content="width=device-width, initial-scale=1"/>
  <title>{} | Divorce with Direction</title>
</head>
<body>
<header>
  <nav>
    <a href="/">Home</a>
    <a href="/services">Services</a>
    <a href="/faq">FAQ</a>
  </nav>
</header>
<main>
{}</main>
<footer>
  <p><a href="mailto:{}">{}</a></p>
  <p><a href="{}">WhatsApp</a></p>
  <p>&copy; {} Divorce with Direction. <a href="/privacy">Privacy Policy</a></p>
</footer>
</body>
</html>"#,
        escape_html(title),
        main,
        escape_html(&footer.email),
        escape_html(&footer.email),
        escape_html(&footer.whatsapp_link),
        footer.copyright_year,
    )
}

// ============================================================================
// Content fetchers (fallback on missing row or no database)
// ============================================================================

async fn fetch_hero() -> HeroContent {
    let Some(pool) = db::get_pool() else {
        return HeroContent::fallback();
    };
    match sqlx::query_as(
        "SELECT id, title, secondary_title, subtitle, cta_button_text, cta_button_link \
         FROM hero_content_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(hero)) => hero,
        Ok(None) => HeroContent::fallback(),
        Err(e) => {
            tracing::error!("Failed to fetch hero content for page render: {}", e);
            HeroContent::fallback()
        }
    }
}

async fn fetch_intro() -> IntroContent {
    let Some(pool) = db::get_pool() else {
        return IntroContent::fallback();
    };
    match sqlx::query_as(
        "SELECT id, heading, body, image_url FROM intro_content_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(intro)) => intro,
        Ok(None) => IntroContent::fallback(),
        Err(e) => {
            tracing::error!("Failed to fetch intro content for page render: {}", e);
            IntroContent::fallback()
        }
    }
}

async fn fetch_sections() -> BTreeMap<String, String> {
    let Some(pool) = db::get_pool() else {
        return BTreeMap::new();
    };
    let rows: Vec<(String, String)> =
        match sqlx::query_as("SELECT key, content FROM section_content_dwd2024 ORDER BY key")
            .fetch_all(pool.as_ref())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Failed to fetch section content for page render: {}", e);
                Vec::new()
            }
        };
    rows.into_iter().collect()
}

async fn fetch_visible_services() -> Vec<Service> {
    let Some(pool) = db::get_pool() else {
        return Vec::new();
    };
    match sqlx::query_as(
        "SELECT id, name, description, price, booking_url, icon, icon_url, order_num, visible \
         FROM services_dwd2024 WHERE visible = true ORDER BY order_num ASC, id ASC",
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(services) => services,
        Err(e) => {
            tracing::error!("Failed to fetch services for page render: {}", e);
            Vec::new()
        }
    }
}

async fn fetch_testimonials() -> Vec<Testimonial> {
    let Some(pool) = db::get_pool() else {
        return Vec::new();
    };
    match sqlx::query_as(
        "SELECT id, name, text, photo_url, created_at \
         FROM testimonials_dwd2024 ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(testimonials) => testimonials,
        Err(e) => {
            tracing::error!("Failed to fetch testimonials for page render: {}", e);
            Vec::new()
        }
    }
}

async fn fetch_faqs() -> Vec<Faq> {
    let Some(pool) = db::get_pool() else {
        return Vec::new();
    };
    match sqlx::query_as(
        "SELECT id, question, answer, order_num FROM faqs_dwd2024 ORDER BY order_num ASC, id ASC",
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(faqs) => faqs,
        Err(e) => {
            tracing::error!("Failed to fetch FAQs for page render: {}", e);
            Vec::new()
        }
    }
}

async fn fetch_footer() -> FooterSettings {
    let Some(pool) = db::get_pool() else {
        return FooterSettings::fallback();
    };
    match sqlx::query_as(
        "SELECT id, email, whatsapp_link, copyright_year FROM footer_settings_dwd2024 WHERE id = 1",
    )
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(footer)) => footer,
        Ok(None) => FooterSettings::fallback(),
        Err(e) => {
            tracing::error!("Failed to fetch footer settings for page render: {}", e);
            FooterSettings::fallback()
        }
    }
}

async fn fetch_calendar() -> CalendarSettings {
    let Some(pool) = db::get_pool() else {
        return CalendarSettings::fallback();
    };
    match sqlx::query_as("SELECT id, booking_url FROM calendar_settings_dwd2024 WHERE id = 1")
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(settings)) => settings,
        Ok(None) => CalendarSettings::fallback(),
        Err(e) => {
            tracing::error!("Failed to fetch calendar settings for page render: {}", e);
            CalendarSettings::fallback()
        }
    }
}

async fn fetch_policy() -> PrivacyPolicy {
    let Some(pool) = db::get_pool() else {
        return PrivacyPolicy::fallback();
    };
    match sqlx::query_as("SELECT id, content FROM privacy_policy_dwd2024 WHERE id = 1")
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(policy)) => policy,
        Ok(None) => PrivacyPolicy::fallback(),
        Err(e) => {
            tracing::error!("Failed to fetch privacy policy for page render: {}", e);
            PrivacyPolicy::fallback()
        }
    }
}

// ============================================================================
// Markup builders
// ============================================================================

fn render_service_card(service: &Service) -> String {
    let mut card = String::from("    <article class=\"service\">\n");

    // Prefer an uploaded icon image over a glyph tag.
    if let Some(icon_url) = &service.icon_url {
        card.push_str(&format!(
            "      <img class=\"service-icon\" src=\"{}\" alt=\"\"/>\n",
            escape_html(icon_url)
        ));
    } else if let Some(icon) = service
        .icon
        .as_deref()
        .and_then(ServiceIcon::parse)
    {
        card.push_str(&format!(
            "      <span class=\"service-icon\">{}</span>\n",
            icon.glyph()
        ));
    }

    card.push_str(&format!("      <h3>{}</h3>\n", escape_html(&service.name)));
    card.push_str(&format!(
        "      <p>{}</p>\n",
        escape_html(&service.description)
    ));
    if let Some(price) = &service.price {
        card.push_str(&format!(
            "      <p class=\"price\">{}</p>\n",
            escape_html(price)
        ));
    }
    card.push_str(&format!(
        "      <a class=\"book\" href=\"{}\">Book Now</a>\n",
        escape_html(&service.booking_url)
    ));
    card.push_str("    </article>\n");
    card
}

fn render_testimonials_section(testimonials: &[Testimonial]) -> String {
    // Section is omitted entirely when there are no testimonials.
    if testimonials.is_empty() {
        return String::new();
    }

    let mut section = String::from(
        "  <section id=\"testimonials\">\n    <h2>What Clients Say</h2>\n",
    );
    for t in testimonials {
        section.push_str("    <blockquote>\n");
        if let Some(photo_url) = &t.photo_url {
            section.push_str(&format!(
                "      <img src=\"{}\" alt=\"{}\"/>\n",
                escape_html(photo_url),
                escape_html(&t.name)
            ));
        }
        section.push_str(&format!("      <p>{}</p>\n", escape_html(&t.text)));
        section.push_str(&format!("      <cite>{}</cite>\n", escape_html(&t.name)));
        section.push_str("    </blockquote>\n");
    }
    section.push_str("  </section>\n");
    section
}

fn render_support_section(sections: &BTreeMap<String, String>) -> String {
    if sections.is_empty() {
        return String::new();
    }

    let mut markup = String::from("  <section id=\"support\">\n");
    for (key, content) in sections {
        markup.push_str(&format!(
            "    <div class=\"block\" data-key=\"{}\">{}</div>\n",
            escape_html(key),
            escape_html(content)
        ));
    }
    markup.push_str("  </section>\n");
    markup
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn home_page() -> Response {
    let hero = fetch_hero().await;
    let intro = fetch_intro().await;
    let sections = fetch_sections().await;
    let services = fetch_visible_services().await;
    let testimonials = fetch_testimonials().await;
    let footer = fetch_footer().await;
    let calendar = fetch_calendar().await;

    let mut main = String::new();

    main.push_str(&format!(
        "  <section id=\"hero\">\n    <h1>{} <em>{}</em></h1>\n    <p>{}</p>\n    <a class=\"cta\" href=\"{}\">{}</a>\n  </section>\n",
        escape_html(&hero.title),
        escape_html(&hero.secondary_title),
        escape_html(&hero.subtitle),
        escape_html(&hero.cta_button_link),
        escape_html(&hero.cta_button_text),
    ));

    main.push_str("  <section id=\"intro\">\n");
    if let Some(image_url) = &intro.image_url {
        main.push_str(&format!(
            "    <img src=\"{}\" alt=\"{}\"/>\n",
            escape_html(image_url),
            escape_html(&intro.heading)
        ));
    }
    main.push_str(&format!(
        "    <h2>{}</h2>\n    <p>{}</p>\n  </section>\n",
        escape_html(&intro.heading),
        escape_html(&intro.body)
    ));

    main.push_str(&render_support_section(&sections));

    if !services.is_empty() {
        main.push_str("  <section id=\"services\">\n    <h2>Services</h2>\n");
        for service in &services {
            main.push_str(&render_service_card(service));
        }
        main.push_str("  </section>\n");
    }

    main.push_str(&render_testimonials_section(&testimonials));

    main.push_str(&format!(
        "  <section id=\"consultation\">\n    <h2>Ready to talk?</h2>\n    <a class=\"cta\" href=\"{}\">Book a Clarity Call</a>\n  </section>\n",
        escape_html(&calendar.booking_url),
    ));

    html_response(page_shell("Home", &main, &footer))
}

/// GET /services
pub async fn services_page() -> Response {
    let services = fetch_visible_services().await;
    let footer = fetch_footer().await;

    let mut main = String::from("  <h1>Services</h1>\n");
    if services.is_empty() {
        main.push_str("  <p>Services are being updated. Please check back soon.</p>\n");
    } else {
        for service in &services {
            main.push_str(&render_service_card(service));
        }
    }

    html_response(page_shell("Services", &main, &footer))
}

/// GET /privacy
/// Policy markup is sanitized on write, so it is rendered unescaped here.
pub async fn privacy_page() -> Response {
    let policy = fetch_policy().await;
    let footer = fetch_footer().await;

    let mut main = String::from("  <h1>Privacy Policy</h1>\n");
    if policy.content.is_empty() {
        main.push_str("  <p>The privacy policy is being prepared.</p>\n");
    } else {
        main.push_str(&policy.content);
        main.push('\n');
    }

    html_response(page_shell("Privacy Policy", &main, &footer))
}

/// GET /faq
pub async fn faq_page() -> Response {
    let faqs = fetch_faqs().await;
    let footer = fetch_footer().await;

    let mut main = String::from("  <h1>Frequently Asked Questions</h1>\n");
    if faqs.is_empty() {
        main.push_str("  <p>No questions yet. Reach out and ask us anything.</p>\n");
    } else {
        for faq in &faqs {
            main.push_str(&format!(
                "  <details>\n    <summary>{}</summary>\n    <p>{}</p>\n  </details>\n",
                escape_html(&faq.question),
                escape_html(&faq.answer)
            ));
        }
    }

    html_response(page_shell("FAQ", &main, &footer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn body_string(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("\"x\""), "&quot;x&quot;");
    }

    #[tokio::test]
    async fn test_home_page_without_db_shows_fallback_hero() {
        let html = body_string(home_page().await).await;
        assert!(html.contains("Find Your Strength"));
        assert!(html.contains("Through Change"));
        assert!(html.contains("Meet Katie"));
    }

    #[tokio::test]
    async fn test_home_page_without_testimonials_omits_section() {
        let html = body_string(home_page().await).await;
        assert!(!html.contains("id=\"testimonials\""));
        assert!(!html.contains("What Clients Say"));
    }

    #[tokio::test]
    async fn test_services_page_without_db_shows_empty_state() {
        let html = body_string(services_page().await).await;
        assert!(html.contains("Services are being updated"));
    }

    #[tokio::test]
    async fn test_faq_page_without_db_shows_empty_state() {
        let html = body_string(faq_page().await).await;
        assert!(html.contains("No questions yet"));
    }

    #[tokio::test]
    async fn test_privacy_page_without_db_shows_placeholder() {
        let html = body_string(privacy_page().await).await;
        assert!(html.contains("being prepared"));
    }

    #[test]
    fn test_testimonials_section_escapes_user_text() {
        let testimonials = vec![Testimonial {
            id: 1,
            name: "Sarah <script>".to_string(),
            text: "Katie & the team changed my life".to_string(),
            photo_url: None,
            created_at: Utc::now(),
        }];
        let markup = render_testimonials_section(&testimonials);
        assert!(markup.contains("Sarah &lt;script&gt;"));
        assert!(markup.contains("Katie &amp; the team"));
    }

    #[test]
    fn test_service_card_prefers_icon_url_over_glyph() {
        let service = Service {
            id: 1,
            name: "Clarity Call".to_string(),
            description: "30 minutes".to_string(),
            price: Some("Free".to_string()),
            booking_url: "https://tidycal.com/dwd/clarity-call".to_string(),
            icon: Some("heart".to_string()),
            icon_url: Some("/uploads/icons/icons-1.png".to_string()),
            order_num: 0,
            visible: true,
        };
        let card = render_service_card(&service);
        assert!(card.contains("/uploads/icons/icons-1.png"));
        assert!(!card.contains(ServiceIcon::Heart.glyph()));
    }
}
