use difference::{Changeset, Difference};
use horrorshow::Raw;

/// Render a character-level diff of the two outputs as an HTML table with a
/// single preformatted cell. One span per run of edits: insertions green,
/// deletions coral, kept text light-gray; a deleted NUL byte renders as the
/// literal [NULL].
pub fn diff_to_html(yours: &str, expected: &str) -> String {
    let changeset = Changeset::new(yours, expected, "");

    let mut body = String::new();
    let mut open_color: Option<&str> = None;
    for diff in &changeset.diffs {
        let (color, text, deleted) = match diff {
            Difference::Same(text) => ("LightGray", text, false),
            Difference::Add(text) => ("LightGreen", text, false),
            Difference::Rem(text) => ("LightCoral", text, true),
        };
        if open_color != Some(color) {
            if open_color.is_some() {
                body.push_str("</span>");
            }
            body.push_str("<span style=\"background-color:");
            body.push_str(color);
            body.push_str("\">");
            open_color = Some(color);
        }
        for c in text.chars() {
            match c {
                '\0' if deleted => body.push_str("[NULL]"),
                '&' => body.push_str("&amp;"),
                '<' => body.push_str("&lt;"),
                '>' => body.push_str("&gt;"),
                other => body.push(other),
            }
        }
    }
    if open_color.is_some() {
        body.push_str("</span>");
    }

    format!("{}", box_html! {
        table {
            tr { th { : "Diff" } }
            tr {
                td(valign="top", style="background-color:LightGray") {
                    pre {
                        |templ| {
                            &mut *templ << Raw(body.clone());
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_one_kept_span() {
        let html = diff_to_html("abc", "abc");
        assert_eq!(html.matches("<span").count(), 1);
        assert!(html.contains("background-color:LightGray\">abc</span>"));
    }

    #[test]
    fn changed_text_opens_colored_spans() {
        let html = diff_to_html("hello", "hallo");
        assert!(html.contains("background-color:LightCoral"));
        assert!(html.contains("background-color:LightGreen"));
    }

    #[test]
    fn deleted_nul_is_spelled_out() {
        let html = diff_to_html("a\0b", "ab");
        assert!(html.contains("[NULL]"));
    }

    #[test]
    fn markup_in_output_is_escaped() {
        let html = diff_to_html("<b>", "<b>");
        assert!(html.contains("&lt;b&gt;"));
    }
}
