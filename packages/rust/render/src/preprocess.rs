//! WordprocessingML clean-up before template parsing.
//!
//! Word splits typed text into runs whenever formatting, spell-checking or
//! revision tracking changes, so a tag like `{{ titre_projet }}` can arrive as
//! several `<w:r>` elements. These passes glue tags back together and expand
//! paragraph- and row-level block tags.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use darwin_shared::{DarwinError, Result};

/// Run the full pre-processing pipeline on one XML part.
pub(crate) fn run_pipeline(xml: &str) -> Result<String> {
    let mut result = merge_split_delimiters(xml);
    result = strip_markup_inside_tags(&result);
    result = hoist_block_tags(&result, "tr")?;
    result = hoist_block_tags(&result, "p")?;
    Ok(result)
}

// ---------------------------------------------------------------------------
// Pass 1: Merge split delimiters
// ---------------------------------------------------------------------------

/// Rejoin `{{`, `{%`, `%}` and `}}` whose two characters ended up in
/// different runs.
fn merge_split_delimiters(xml: &str) -> String {
    static SPLIT_RE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        [
            (r"\{(?:<[^>]*>)+\{", "{{"),
            (r"\{(?:<[^>]*>)+%", "{%"),
            (r"%(?:<[^>]*>)+\}", "%}"),
            (r"\}(?:<[^>]*>)+\}", "}}"),
        ]
        .into_iter()
        .map(|(pattern, joined)| (Regex::new(pattern).expect("valid regex"), joined))
        .collect()
    });

    let mut result = xml.to_string();
    for (re, joined) in SPLIT_RE.iter() {
        result = re.replace_all(&result, *joined).into_owned();
    }
    result
}

// ---------------------------------------------------------------------------
// Pass 2: Strip markup inside tags
// ---------------------------------------------------------------------------

/// Remove run boundaries and other XML tags found between a tag's
/// delimiters, and undo the entity escaping Word applies to its body.
fn strip_markup_inside_tags(xml: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("valid regex"));
    static MARKUP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    TAG_RE
        .replace_all(xml, |caps: &Captures<'_>| {
            let stripped = MARKUP_RE.replace_all(&caps[0], "");
            stripped
                .replace("&quot;", "\"")
                .replace("&apos;", "'")
                .replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&amp;", "&")
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Block tags
// ---------------------------------------------------------------------------

/// Replace every `<w:{element}>` that contains a `{%{element} … %}` tag with
/// the plain statement `{% … %}`.
///
/// This is how a loop repeats whole table rows or paragraphs without leaving
/// empty ones behind where the control tags were typed.
fn hoist_block_tags(xml: &str, element: &str) -> Result<String> {
    let marker = format!("{{%{element} ");
    let close = format!("</w:{element}>");

    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(tag_start) = rest.find(&marker) {
        let tag_end = rest[tag_start..]
            .find("%}")
            .map(|i| tag_start + i + 2)
            .ok_or_else(|| DarwinError::render(marker.trim_end(), "unterminated block tag"))?;
        let statement = rest[tag_start + marker.len()..tag_end - 2].trim();

        let Some(elem_start) = find_element_start(&rest[..tag_start], element) else {
            return Err(DarwinError::render(
                statement,
                format!("`{{%{element}` tag is not inside a <w:{element}> element"),
            ));
        };
        let Some(elem_end) = rest[tag_end..].find(&close).map(|i| tag_end + i + close.len()) else {
            return Err(DarwinError::render(
                statement,
                format!("<w:{element}> holding the tag is never closed"),
            ));
        };

        out.push_str(&rest[..elem_start]);
        out.push_str("{% ");
        out.push_str(statement);
        out.push_str(" %}");
        rest = &rest[elem_end..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Offset of the last `<w:{element}>` or `<w:{element} …>` opening tag in
/// `before`. `<w:pPr>` and friends do not count.
fn find_element_start(before: &str, element: &str) -> Option<usize> {
    let bare = before.rfind(&format!("<w:{element}>"));
    let with_attrs = before.rfind(&format!("<w:{element} "));
    bare.max(with_attrs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_tags_split_across_runs() {
        let xml = r#"<w:r><w:t>{</w:t></w:r><w:r><w:t>{ titre_</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>projet }</w:t></w:r><w:r><w:t>}</w:t></w:r>"#;
        let out = run_pipeline(xml).unwrap();
        assert!(out.contains("{{ titre_projet }}"), "got {out}");
    }

    #[test]
    fn decodes_entities_inside_tags_only() {
        let xml = "<w:t>a &amp; b {% if not has_schema %}</w:t>";
        let out = strip_markup_inside_tags(xml);
        assert_eq!(out, "<w:t>a &amp; b {% if not has_schema %}</w:t>");

        let quoted = strip_markup_inside_tags("{{ &quot;x&quot; }}");
        assert_eq!(quoted, "{{ \"x\" }}");
    }

    #[test]
    fn row_tags_replace_their_row() {
        let xml = concat!(
            "<w:tbl>",
            "<w:tr><w:tc><w:p><w:r><w:t>{%tr for a in acteurs %}</w:t></w:r></w:p></w:tc></w:tr>",
            "<w:tr><w:tc><w:p><w:r><w:t>{{ a.acteur }}</w:t></w:r></w:p></w:tc></w:tr>",
            "<w:tr w:rsidR=\"00AB\"><w:tc><w:p><w:r><w:t>{%tr endfor %}</w:t></w:r></w:p></w:tc></w:tr>",
            "</w:tbl>"
        );
        let out = run_pipeline(xml).unwrap();
        assert_eq!(
            out,
            concat!(
                "<w:tbl>",
                "{% for a in acteurs %}",
                "<w:tr><w:tc><w:p><w:r><w:t>{{ a.acteur }}</w:t></w:r></w:p></w:tc></w:tr>",
                "{% endfor %}",
                "</w:tbl>"
            )
        );
    }

    #[test]
    fn paragraph_tags_skip_paragraph_properties() {
        let xml = r#"<w:p w:rsidR="1"><w:pPr><w:pStyle w:val="Normal"/></w:pPr><w:r><w:t>{%p if has_schema %}</w:t></w:r></w:p><w:p><w:r><w:t>x</w:t></w:r></w:p><w:p><w:r><w:t>{%p endif %}</w:t></w:r></w:p>"#;
        let out = run_pipeline(xml).unwrap();
        assert_eq!(
            out,
            "{% if has_schema %}<w:p><w:r><w:t>x</w:t></w:r></w:p>{% endif %}"
        );
    }

    #[test]
    fn block_tag_outside_element_is_an_error() {
        let err = hoist_block_tags("<w:t>{%tr for a in b %}</w:t>", "tr").unwrap_err();
        assert!(err.to_string().contains("not inside"));
    }

    #[test]
    fn plain_text_is_untouched() {
        let xml = "<w:p><w:r><w:t>Aucun tag ici</w:t></w:r></w:p>";
        assert_eq!(run_pipeline(xml).unwrap(), xml);
    }
}
