//! Code block extraction from answer HTML
//!
//! `<pre>` blocks (with or without an inner `<code>`) are preferred. Only
//! when none exist does inline `<code>` get used. Markup is stripped,
//! entities decoded and fragments shorter than three characters dropped.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

const MIN_FRAGMENT_CHARS: usize = 3;

static PRE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("pre").ok());
static CODE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("code").ok());

/// Extract code blocks from an HTML fragment, in document order
#[must_use]
pub fn extract_code_blocks(html: &str) -> Vec<String> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let (Some(pre), Some(code)) = (PRE.as_ref(), CODE.as_ref()) else {
        return Vec::new();
    };

    let document = Html::parse_fragment(html);

    let mut blocks: Vec<String> = document
        .select(pre)
        .map(|block| match block.select(code).next() {
            Some(inner) => text_of(inner),
            None => text_of(block),
        })
        .filter(|text| !text.trim().is_empty())
        .collect();

    if blocks.is_empty() {
        blocks = document
            .select(code)
            .map(text_of)
            .filter(|text| !text.trim().is_empty())
            .collect();
    }

    blocks
        .into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| b.chars().count() >= MIN_FRAGMENT_CHARS)
        .collect()
}

/// Decoded text of every descendant text node
fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pre_code_blocks_in_order() {
        let html = r#"<p>Try this:</p>
<pre class="lang-py"><code>s = 'hello'
print(s[::-1])
</code></pre>
<p>or</p><PRE>print(''.join(reversed(s)))</PRE>"#;
        assert_eq!(
            extract_code_blocks(html),
            vec![
                "s = 'hello'\nprint(s[::-1])".to_string(),
                "print(''.join(reversed(s)))".to_string(),
            ]
        );
    }

    #[test]
    fn inline_code_only_without_pre() {
        let with_pre = "<p>Use <code>sorted(x)</code></p><pre><code>print(sorted([2, 1]))</code></pre>";
        assert_eq!(extract_code_blocks(with_pre), vec!["print(sorted([2, 1]))"]);

        let inline_only = "<p>Use <code>sorted(x)</code> or <code>x</code>.</p>";
        assert_eq!(extract_code_blocks(inline_only), vec!["sorted(x)"]);
    }

    #[test]
    fn entities_are_decoded_and_tags_stripped() {
        let html = "<pre><code>if a &lt; b &amp;&amp; c &gt; d:\n    print(&quot;&#39;ok&#x27;&quot;)<span>  </span></code></pre>";
        assert_eq!(
            extract_code_blocks(html),
            vec!["if a < b && c > d:\n    print(\"'ok'\")"]
        );
    }

    #[test]
    fn named_entities_beyond_the_basics() {
        let html = "<pre>print(&apos;x&apos;) &ndash; &hellip; &copy;</pre>";
        assert_eq!(extract_code_blocks(html), vec!["print('x') \u{2013} \u{2026} \u{a9}"]);
    }

    #[test]
    fn bare_less_than_inside_pre_is_text() {
        let html = "<pre>if a < b: pass\nprint(a <= b)</pre>";
        assert_eq!(extract_code_blocks(html), vec!["if a < b: pass\nprint(a <= b)"]);
    }

    #[test]
    fn unknown_entities_are_kept() {
        let html = "<pre>a &bogus; b &amp; c</pre>";
        assert_eq!(extract_code_blocks(html), vec!["a &bogus; b & c"]);
    }

    #[test]
    fn similar_tag_names_do_not_match() {
        let html = "<prefix>nope</prefix><pre>print(1)</pre>";
        assert_eq!(extract_code_blocks(html), vec!["print(1)"]);
    }

    #[test]
    fn empty_and_tiny_inputs() {
        assert!(extract_code_blocks("").is_empty());
        assert!(extract_code_blocks("<p>no code here</p>").is_empty());
        assert!(extract_code_blocks("<pre>ab</pre><pre>   </pre>").is_empty());
    }
}
