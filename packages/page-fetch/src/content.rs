//! HTML inspection helpers.
//!
//! Uses the `scraper` crate for parsing and `htmd` for Markdown conversion.

use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref BODY: Selector = Selector::parse("body").expect("valid selector");
}

/// Markers left in the initial HTML by client-side frameworks.
const JS_FRAMEWORK_MARKERS: &[&str] = &[
    "__NEXT_DATA__",
    "window.__NUXT__",
    "data-reactroot",
    "ng-version=",
    "data-v-app",
    "data-server-rendered",
    "window.__INITIAL_STATE__",
    "id=\"___gatsby\"",
    "you need to enable javascript",
    "please enable javascript",
];

/// Empty mount points that frameworks hydrate into.
const EMPTY_ROOT_CONTAINERS: &[&str] = &[
    "<div id=\"root\"></div>",
    "<div id=\"app\"></div>",
    "<div id=\"__next\"></div>",
    "<div id=\"root\"> </div>",
    "<app-root></app-root>",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "cf-challenge",
    "cf_chl_opt",
    "challenge-platform",
    "are you a robot",
    "verify you are human",
    "captcha-delivery.com",
];

/// Elements that never carry readable content.
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Does the document look like an unhydrated client-rendered shell?
pub fn looks_js_rendered(html: &str) -> bool {
    let lower = html.to_lowercase();
    let compact: String = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    JS_FRAMEWORK_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
        || EMPTY_ROOT_CONTAINERS
            .iter()
            .any(|container| compact.contains(container))
}

/// Does the document look like an anti-bot challenge page?
pub fn looks_like_captcha(html: &str) -> bool {
    // Real pages can embed a captcha widget in a form; challenge pages are short.
    if word_count(html) > 300 {
        return false;
    }
    let lower = html.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Count words of visible body text.
pub fn word_count(html: &str) -> usize {
    visible_text(html).split_whitespace().count()
}

/// Visible text of the document body, skipping script/style content.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match document.select(&BODY).next() {
        Some(body) => body,
        None => document.root_element(),
    };

    let mut text = String::new();
    for node in root.descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }
    text
}

/// Extract the document title.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract main content HTML, stripping nav/header/footer/aside.
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);
    let main_selectors = [
        "main",
        "article",
        "[role='main']",
        "#content",
        "#main",
        ".content",
        ".post-content",
        ".entry-content",
    ];

    for selector_str in main_selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(main) = document.select(&selector).next() {
                return remove_boilerplate(&main.html());
            }
        }
    }

    match document.select(&BODY).next() {
        Some(body) => remove_boilerplate(&body.html()),
        None => document.html(),
    }
}

fn remove_boilerplate(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let unwanted = [
        "nav", "header", "footer", "aside", ".navbar", ".sidebar", ".menu", ".advertisement",
        ".ads", "#cookie-banner", "script", "style", "noscript", "iframe",
    ];

    let mut result = html.to_string();
    for selector_str in unwanted {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                result = result.replace(&element.html(), "");
            }
        }
    }
    result
}

/// Convert a page to Markdown for downstream scoring.
pub fn html_to_markdown(html: &str) -> String {
    let main = extract_main_content(html);
    htmd::convert(&main).unwrap_or_else(|_| visible_text(&main))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_ignores_scripts() {
        let html = r#"<html><body><p>three little words</p>
            <script>var a = "not counted at all";</script>
            <style>.x { color: red }</style></body></html>"#;
        assert_eq!(word_count(html), 3);
    }

    #[test]
    fn test_detects_empty_root() {
        let html = r#"<html><head><script src="/main.js"></script></head>
            <body><div id="root">
            </div></body></html>"#;
        assert!(looks_js_rendered(html));
    }

    #[test]
    fn test_detects_next_data() {
        let html = r#"<body><div id="__next"><p>hi</p></div>
            <script id="__NEXT_DATA__" type="application/json">{}</script></body>"#;
        assert!(looks_js_rendered(html));
    }

    #[test]
    fn test_static_page_not_js_rendered() {
        let html = "<html><body><h1>Pricing</h1><p>Plans start at $10.</p></body></html>";
        assert!(!looks_js_rendered(html));
    }

    #[test]
    fn test_captcha_detection() {
        let challenge = r#"<html><body><h1>Verify you are human</h1>
            <div class="g-recaptcha"></div></body></html>"#;
        assert!(looks_like_captcha(challenge));
        assert!(!looks_like_captcha("<html><body><p>Welcome</p></body></html>"));
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title> Test Page </title></head><body></body></html>";
        assert_eq!(extract_title(html), Some("Test Page".to_string()));
        assert_eq!(extract_title("<html><body></body></html>"), None);
    }

    #[test]
    fn test_markdown_drops_navigation() {
        let html = r#"<html><body><nav><a href="/">Home</a></nav>
            <main><h1>Hello</h1><p>World</p></main></body></html>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
        assert!(!md.contains("Home"));
    }
}
