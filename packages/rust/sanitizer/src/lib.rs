//! Rich-text sanitizing for document requests.
//!
//! Some request fields are filled by a rich-text editor and carry inline HTML
//! (paragraphs, line breaks, lists). Before the request is bound into the
//! template, those fields are reduced to plain text with line breaks and
//! bullet markers. Everything else in the request passes through untouched.
//!
//! Markup is read with a real HTML parser (`scraper`), so malformed or hostile
//! input degrades to its text content instead of leaking tags.

mod cleanup;

use scraper::{ElementRef, Html, Node};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use darwin_shared::{DarwinError, DocumentRequest, Result};

/// Field names whose string values are treated as rich text, at any depth.
pub const RICH_TEXT_FIELDS: &[&str] = &[
    "objet_document",
    "schema_description",
    "description_architecture",
    "description_authentification",
    "description_administrationtechnique",
    "description_adminfonctionnelle",
    "description_interapplicative",
    "deploiement",
    "migration_reprise",
    "supervision",
    "sauvegarde_restauration",
    "contraintes",
    "niveau_services",
    // sub-record fields
    "description",
    "commentaires",
];

/// Bullet emitted in front of every list item.
pub const BULLET: &str = "• ";

/// Elements whose closing ends a line.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "pre",
    "tr",
];

/// Elements dropped together with their content.
const DROPPED_TAGS: &[&str] = &["script", "style", "template", "noscript", "head"];

/// Containers whose whitespace-only text is layout, not content.
const LAYOUT_CONTAINERS: &[&str] = &["ul", "ol", "table", "thead", "tbody", "tfoot", "tr"];

/// Upper bound on sanitizing passes over one value.
///
/// A pass unwraps at most one level of entity escaping, so this caps how
/// deeply escaped markup (`&amp;lt;li&amp;gt;` and deeper) is normalized.
const MAX_PASSES: usize = 16;

/// Whether `name` is a rich-text field.
pub fn is_rich_text_field(name: &str) -> bool {
    RICH_TEXT_FIELDS.contains(&name)
}

// ---------------------------------------------------------------------------
// Tree sanitizing
// ---------------------------------------------------------------------------

/// Sanitize every rich-text field of a request value tree.
///
/// Recurses into objects and arrays. Object keys, array order and every value
/// that is not a rich-text string are preserved as-is.
#[instrument(skip_all)]
pub fn sanitize_tree(value: Value) -> Value {
    sanitize_value(value)
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) if is_rich_text_field(&key) => {
                            Value::String(sanitize_rich_text(&s))
                        }
                        other => sanitize_value(other),
                    };
                    (key, value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        scalar => scalar,
    }
}

/// Sanitize a typed request, returning a cleaned copy.
pub fn sanitize_request(request: &DocumentRequest) -> Result<DocumentRequest> {
    let value = serde_json::to_value(request)
        .map_err(|e| DarwinError::validation(format!("request is not serializable: {e}")))?;
    serde_json::from_value(sanitize_tree(value))
        .map_err(|e| DarwinError::validation(format!("sanitized request is malformed: {e}")))
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// Reduce one rich-text value to plain text.
///
/// 1. paragraph, line and list-item ends become newlines
/// 2. list items are prefixed with [`BULLET`]
/// 3. every other tag is removed, its text kept
/// 4. entities are decoded
/// 5. runs of blank lines collapse to one
/// 6. the result is trimmed
///
/// The pass is repeated until the text no longer changes, so that decoded
/// text which itself looks like markup cannot survive a second call.
pub fn sanitize_rich_text(input: &str) -> String {
    let mut current = sanitize_once(input);
    for _ in 1..MAX_PASSES {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        debug!(before = current.len(), after = next.len(), "re-sanitizing decoded markup");
        current = next;
    }
    warn!(len = current.len(), "rich text still changing after {MAX_PASSES} passes");
    current
}

fn sanitize_once(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return cleanup::run_pipeline(input);
    }

    let fragment = Html::parse_fragment(input);
    let mut text = String::with_capacity(input.len());
    walk_children(fragment.root_element(), &mut text);

    cleanup::run_pipeline(&text)
}

/// Append the text of `el`'s children to `out`.
fn walk_children(el: ElementRef<'_>, out: &mut String) {
    let layout = LAYOUT_CONTAINERS.contains(&el.value().name());

    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                if layout && text.trim().is_empty() {
                    continue;
                }
                out.push_str(text);
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    visit_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn visit_element(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();

    if DROPPED_TAGS.contains(&name) {
        return;
    }

    match name {
        "br" => out.push('\n'),
        "li" => {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(BULLET);
            walk_children(el, out);
            // <li><p>x</p></li> already ended its line
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        _ if BLOCK_TAGS.contains(&name) => {
            walk_children(el, out);
            out.push('\n');
        }
        _ => walk_children(el, out),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn paragraphs_become_lines() {
        assert_eq!(sanitize_rich_text("<p>A</p><p>B</p>"), "A\nB");
    }

    #[test]
    fn list_items_get_bullets() {
        assert_eq!(sanitize_rich_text("<li>X</li><li>Y</li>"), "• X\n• Y");
    }

    #[test]
    fn editor_lists_with_paragraphs_stay_compact() {
        let input = "<p>Intro</p><ul><li><p>One</p></li><li><p>Two</p></li></ul><p>End</p>";
        assert_eq!(sanitize_rich_text(input), "Intro\n• One\n• Two\nEnd");
    }

    #[test]
    fn nested_list_items_start_on_their_own_line() {
        let input = "<ul><li>Parent<ul><li>Child</li></ul></li></ul>";
        assert_eq!(sanitize_rich_text(input), "• Parent\n• Child");
    }

    #[test]
    fn line_breaks_become_newlines() {
        assert_eq!(sanitize_rich_text("a<br>b<br/>c"), "a\nb\nc");
    }

    #[test]
    fn inline_tags_are_removed() {
        let input = "<p>This is <strong>bold</strong> and <em>shy</em> <mark data-color=\"#FFEB3B\">text</mark></p>";
        assert_eq!(sanitize_rich_text(input), "This is bold and shy text");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(sanitize_rich_text("<p>Tom &amp; Jerry&nbsp;!</p>"), "Tom & Jerry\u{a0}!");
    }

    #[test]
    fn blank_line_runs_collapse_to_one() {
        let input = "<p>x</p><p></p><p></p><p></p><p>y</p>";
        assert_eq!(sanitize_rich_text(input), "x\n\ny");
        assert_eq!(sanitize_rich_text("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn scripts_are_dropped_with_content() {
        let input = "<script>alert(1)</script><p>safe</p><style>p{}</style>";
        assert_eq!(sanitize_rich_text(input), "safe");
    }

    #[test]
    fn malformed_markup_degrades_to_text() {
        assert_eq!(sanitize_rich_text("<p>unclosed <b>bold"), "unclosed bold");
        assert_eq!(sanitize_rich_text("R&D < budget"), "R&D < budget");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(sanitize_rich_text("  \n\t "), "");
        assert_eq!(sanitize_rich_text("<p> </p>"), "");
    }

    #[test]
    fn escaped_markup_is_normalized_in_one_call() {
        assert_eq!(sanitize_rich_text("&lt;li&gt;x"), "• x");
        assert_eq!(sanitize_rich_text("a&lt;li&gt;b"), "a\n• b");
        assert_eq!(sanitize_rich_text("&amp;lt;p&amp;gt;y"), "y");
    }

    #[test]
    fn literal_angle_brackets_are_stable() {
        let once = sanitize_rich_text("Tom &amp; Jerry &lt;3");
        assert_eq!(once, "Tom & Jerry <3");
        assert_eq!(sanitize_rich_text(&once), once);
    }

    fn rich_text_fragment() -> impl Strategy<Value = String> {
        let token = prop::sample::select(vec![
            "<p>", "</p>", "<li>", "</li>", "<ul>", "</ul>", "<ol>", "<br>", "<b>", "</b>",
            "<div>", "<script>", "</script>", "&lt;", "&gt;", "&amp;", "&nbsp;", "&#60;",
            "<", ">", "&", "/", ";", "li", "p", "lt", "x", "Ab", " ", "\n", "\t", "\r\n",
        ]);
        prop::collection::vec(token, 0..24).prop_map(|tokens| tokens.concat())
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in rich_text_fragment()) {
            let once = sanitize_rich_text(&input);
            let twice = sanitize_rich_text(&once);
            prop_assert_eq!(&once, &twice, "input: {:?}", input);
        }

        #[test]
        fn sanitized_text_is_trimmed(input in rich_text_fragment()) {
            let out = sanitize_rich_text(&input);
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }

    #[test]
    fn tree_sanitizes_only_rich_text_fields() {
        let tree = json!({
            "titre_projet": "<b>Mon Projet</b>",
            "objet_document": "<p>A</p><p>B</p>",
            "has_schema": true,
            "acteurs": [
                {"acteur": "<i>Dev</i>", "commentaires": "<li>X</li><li>Y</li>"},
                {"acteur": "Ops", "commentaires": ""}
            ],
            "vms": [{"nom": "SRV-01", "cpu": 4}]
        });

        let out = sanitize_tree(tree);

        // Non-rich-text values are untouched, even when they contain markup.
        assert_eq!(out["titre_projet"], "<b>Mon Projet</b>");
        assert_eq!(out["acteurs"][0]["acteur"], "<i>Dev</i>");
        assert_eq!(out["has_schema"], true);
        assert_eq!(out["vms"][0]["cpu"], 4);

        assert_eq!(out["objet_document"], "A\nB");
        assert_eq!(out["acteurs"][0]["commentaires"], "• X\n• Y");
    }

    #[test]
    fn tree_preserves_collection_order_and_length() {
        let tree = json!({
            "briques_fonctionnelles": [
                {"brique": "1", "description": "<p>one</p>"},
                {"brique": "2", "description": "<p>two</p>"},
                {"brique": "3", "description": "<p>three</p>"}
            ]
        });

        let out = sanitize_tree(tree);
        let items = out["briques_fonctionnelles"].as_array().expect("array");
        assert_eq!(items.len(), 3);
        let order: Vec<_> = items.iter().map(|i| i["brique"].as_str().unwrap()).collect();
        assert_eq!(order, ["1", "2", "3"]);
        assert_eq!(items[2]["description"], "three");
    }

    #[test]
    fn tree_sanitize_is_idempotent() {
        let tree = json!({
            "contraintes": "<p>a</p><p></p><p></p><p></p><p>b &amp;lt;c&amp;gt;</p>",
            "flux_reseau": [{"description": "<ul><li>TCP</li></ul>", "type_flux": "<TCP>"}]
        });
        let once = sanitize_tree(tree);
        let twice = sanitize_tree(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn typed_request_is_cleaned_in_place() {
        let request = DocumentRequest::from_json(
            r#"{"titre_projet": "Darwin", "contraintes": "<p>a</p><p>b</p>",
                "acteurs": [{"acteur": "Dev", "commentaires": "<li>X</li>"}]}"#,
        )
        .expect("parse");

        let clean = sanitize_request(&request).expect("sanitize");
        assert_eq!(clean.titre_projet, "Darwin");
        assert_eq!(clean.contraintes, "a\nb");
        assert_eq!(clean.acteurs[0].commentaires, "• X");
        assert_eq!(request.contraintes, "<p>a</p><p>b</p>");
    }

    #[test]
    fn non_string_rich_text_key_is_left_alone() {
        let out = sanitize_tree(json!({"description": 42}));
        assert_eq!(out["description"], 42);
    }
}
