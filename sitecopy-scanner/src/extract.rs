//! Reference discovery in HTML documents and stylesheet text.
//!
//! Stylesheets are not parsed. A pattern picks out anything that looks like a path ending in a
//! known media extension, which is enough for background images and web fonts. `@import` and
//! generic `url()` values are not followed.

use crate::paths::{resolve_css_reference, resolve_link};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Elements whose `style` attribute is scanned for media references. Anything not listed here
/// is ignored.
pub const STYLED_ELEMENTS: &[&str] = &[
    "a", "acronym", "article", "audio", "b", "body", "br", "button", "canvas", "caption",
    "center", "code", "details", "div", "em", "fieldset", "font", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "head", "hr", "i", "iframe", "img", "input", "label", "legend", "li",
    "link", "menu", "menuitem", "meter", "nav", "ol", "p", "pre", "progress", "section", "select",
    "small", "source", "span", "strike", "strong", "table", "tbody", "td", "textarea", "tfoot",
    "th", "thead", "title", "tr", "tt", "ul", "video",
];

/// Extensions the stylesheet pattern recognises.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "ogg", "ogv", "m4v", "mp4", "webm", "ico", "png", "jpg", "jpeg", "gif", "webp", "svg",
    "eot", "woff", "woff2", "ttf", "otf",
];

static MEDIA_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\.\./)*(?:(?:https?:)?//[A-Za-z0-9.\-]+(?::[0-9]+)?)?/?(?:[A-Za-z0-9_.\-]+/)*[A-Za-z0-9_.\-]+?\.(?:mp3|ogg|ogv|m4v|mp4|webm|ico|png|jpe?g|gif|webp|svg|eot|woff2?|ttf|otf)\b",
    )
    .expect("media reference pattern is valid")
});

static ATTRIBUTE_RULES: LazyLock<Vec<(Selector, &'static str, ReferenceKind)>> =
    LazyLock::new(|| {
        [
            ("a[href]", "href", ReferenceKind::Link),
            ("img[src]", "src", ReferenceKind::Image),
            ("link[href]", "href", ReferenceKind::Stylesheet),
            ("script[src]", "src", ReferenceKind::Script),
            ("div[data-avia-tooltip]", "data-avia-tooltip", ReferenceKind::Tooltip),
        ]
        .into_iter()
        .map(|(css, attr, kind)| {
            let selector = Selector::parse(css).expect("attribute selector is valid");
            (selector, attr, kind)
        })
        .collect()
    });

static STYLE_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("style").expect("style selector is valid"));

static STYLED: LazyLock<Selector> = LazyLock::new(|| {
    let list = STYLED_ELEMENTS
        .iter()
        .map(|name| format!("{}[style]", name))
        .collect::<Vec<_>>()
        .join(", ");
    Selector::parse(&list).expect("styled element selector is valid")
});

/// Where a reference was found. The closed set decides how it is resolved and scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Link,
    Image,
    Script,
    Stylesheet,
    Tooltip,
    /// Found in a `style` attribute or a `<style>` block.
    InlineStyle,
    /// Found in a fetched stylesheet.
    CssUrl,
}

impl ReferenceKind {
    /// CSS-embedded references are downloaded inline with their stylesheet instead of going
    /// through the frontier.
    pub fn is_css_embedded(self) -> bool {
        matches!(self, ReferenceKind::InlineStyle | ReferenceKind::CssUrl)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Link => "link",
            ReferenceKind::Image => "image",
            ReferenceKind::Script => "script",
            ReferenceKind::Stylesheet => "stylesheet-href",
            ReferenceKind::Tooltip => "tooltip-attr",
            ReferenceKind::InlineStyle => "inline-style",
            ReferenceKind::CssUrl => "css-url",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredReference {
    pub raw: String,
    pub source: Url,
    pub kind: ReferenceKind,
}

impl DiscoveredReference {
    /// Absolute URL this reference points at, if it points anywhere fetchable.
    pub fn resolve(&self) -> Option<Url> {
        if self.kind.is_css_embedded() {
            resolve_css_reference(&self.raw, &self.source)
        } else {
            resolve_link(&self.source, &self.raw)
        }
    }
}

/// Every reference in an HTML document, in document order per rule.
pub fn extract_document(html: &str, source: &Url) -> Vec<DiscoveredReference> {
    let document = Html::parse_document(html);
    let mut references = Vec::new();

    for (selector, attr, kind) in ATTRIBUTE_RULES.iter() {
        for element in document.select(selector) {
            if let Some(value) = element.value().attr(attr) {
                references.push(DiscoveredReference {
                    raw: value.to_string(),
                    source: source.clone(),
                    kind: *kind,
                });
            }
        }
    }

    for block in document.select(&STYLE_BLOCKS) {
        let text: String = block.text().collect();
        references.extend(extract_stylesheet(&text, source, ReferenceKind::InlineStyle));
    }

    for element in document.select(&STYLED) {
        if let Some(style) = element.value().attr("style") {
            references.extend(extract_stylesheet(style, source, ReferenceKind::InlineStyle));
        }
    }

    references
}

/// Media references in stylesheet text, each reported once per call.
pub fn extract_stylesheet(text: &str, source: &Url, kind: ReferenceKind) -> Vec<DiscoveredReference> {
    let mut seen = HashSet::new();
    MEDIA_REFERENCE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|raw| seen.insert(*raw))
        .map(|raw| DiscoveredReference {
            raw: raw.to_string(),
            source: source.clone(),
            kind,
        })
        .collect()
}
