//! Card HTML to plain text
//!
//! Reviewer HTML is flattened for display and grading context. For speech,
//! a `div` whose class list contains `README` is authoritative when present,
//! and the innermost `lang` attribute inside it selects the TTS voice.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").expect("valid selector"));

/// Text to be spoken for one side of a card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechText {
    pub text: String,
    pub language: Option<String>,
}

/// Strip markup into whitespace-joined text
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    join_text(doc.root_element())
}

/// Extract the speakable text and language tag for one side of a card
///
/// When `exclude_from_front` is set, `README` blocks nested anywhere inside a
/// `.from-front` container are ignored. Falls back to the full text with no
/// language when no usable `README` block exists.
#[must_use]
pub fn speech_text(html: &str, exclude_from_front: bool) -> SpeechText {
    if html.trim().is_empty() {
        return SpeechText::default();
    }

    let doc = Html::parse_fragment(html);

    let readme = doc.select(&DIV).find(|div| {
        has_class(*div, "README") && !(exclude_from_front && inside_from_front(*div))
    });

    let Some(readme) = readme else {
        return SpeechText {
            text: join_text(doc.root_element()),
            language: None,
        };
    };

    SpeechText {
        text: join_text(readme),
        language: innermost_lang(readme),
    }
}

fn join_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn inside_from_front(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "div" && has_class(a, "from-front"))
}

/// The most deeply nested `lang` inside `root`, ties going to document order
fn innermost_lang(root: ElementRef<'_>) -> Option<String> {
    let mut best: Option<(usize, &str)> = root.value().attr("lang").map(|l| (0, l));

    for element in root.descendants().filter_map(ElementRef::wrap) {
        if element.id() == root.id() {
            continue;
        }
        let Some(lang) = element.value().attr("lang") else {
            continue;
        };
        let depth = element
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .count()
            + 1;
        if best.is_none_or(|(d, _)| depth > d) {
            best = Some((depth, lang));
        }
    }

    best.map(|(_, lang)| lang.to_string())
}
