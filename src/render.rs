//! Side-by-side presentation of an edit script
//!
//! Equal lines go to both columns, deletions only to the left, insertions
//! only to the right, so the two columns may have different lengths.
//!
//! File content and model output are untrusted. Everything that ends up in
//! markup goes through [`escape_html`].

use crate::diff::EditOp;
use unicode_width::UnicodeWidthChar;

/// How a rendered line is marked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMark {
    Unchanged,
    Removed,
    Added,
}

impl LineMark {
    fn css_class(&self) -> &'static str {
        match self {
            LineMark::Unchanged => "equal",
            LineMark::Removed => "del",
            LineMark::Added => "add",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            LineMark::Unchanged => "",
            LineMark::Removed => "- ",
            LineMark::Added => "+ ",
        }
    }
}

/// One line of a column, raw (unescaped) text plus its mark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledLine {
    pub mark: LineMark,
    pub text: String,
}

impl StyledLine {
    fn new(mark: LineMark, text: &str) -> Self {
        Self {
            mark,
            text: text.to_string(),
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            "<span class=\"line {}\">{}{}</span>",
            self.mark.css_class(),
            self.mark.prefix(),
            escape_html(&self.text)
        )
    }
}

/// Original column on the left, proposed column on the right
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideBySide {
    pub left: Vec<StyledLine>,
    pub right: Vec<StyledLine>,
}

/// Lay an edit script out into two columns.
pub fn render(ops: &[EditOp]) -> SideBySide {
    let mut view = SideBySide::default();
    for op in ops {
        match op {
            EditOp::Equal(line) => {
                view.left.push(StyledLine::new(LineMark::Unchanged, line));
                view.right.push(StyledLine::new(LineMark::Unchanged, line));
            }
            EditOp::Delete(line) => view.left.push(StyledLine::new(LineMark::Removed, line)),
            EditOp::Insert(line) => view.right.push(StyledLine::new(LineMark::Added, line)),
        }
    }
    view
}

impl SideBySide {
    pub fn to_html(&self) -> String {
        let left: String = self.left.iter().map(StyledLine::to_html).collect();
        let right: String = self.right.iter().map(StyledLine::to_html).collect();
        format!(
            "<div class=\"diff-panels\">\
             <div class=\"panel\" aria-label=\"Original\">{left}</div>\
             <div class=\"panel\" aria-label=\"Proposed\">{right}</div>\
             </div>"
        )
    }

    /// Plain text with the columns next to each other, each padded or clipped
    /// to `column_width` display cells.
    pub fn to_terminal(&self, column_width: usize) -> String {
        let rows = self.left.len().max(self.right.len());
        let mut out = String::new();
        for row in 0..rows {
            let left = self.left.get(row).map(cell_text).unwrap_or_default();
            let right = self.right.get(row).map(cell_text).unwrap_or_default();
            out.push_str(&fit_width(&left, column_width));
            out.push_str(" │ ");
            out.push_str(right.trim_end());
            out.push('\n');
        }
        out
    }
}

/// Markup for one reviewed file: a selection checkbox, the file name and its
/// side-by-side diff.
pub fn render_file_html(name: &str, accepted: bool, view: &SideBySide) -> String {
    let name = escape_html(name);
    let checked = if accepted { " checked" } else { "" };
    format!(
        "<div class=\"diff-item\">\
         <div class=\"diff-item-header\">\
         <input type=\"checkbox\" class=\"diff-select\" data-name=\"{name}\"{checked} />\
         <span class=\"diff-filename\">{name}</span>\
         </div>{}</div>",
        view.to_html()
    )
}

/// Escape text for embedding in HTML element content or quoted attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn cell_text(line: &StyledLine) -> String {
    let prefix = match line.mark {
        LineMark::Unchanged => "  ",
        other => other.prefix(),
    };
    // Tabs and carriage returns would break column alignment
    let body = line.text.replace('\t', "    ").replace('\r', "");
    format!("{prefix}{body}")
}

fn fit_width(s: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    if used < width {
        out.push_str(&" ".repeat(width - used));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_text;

    #[test]
    fn test_columns_follow_operations() {
        let view = render(&diff_text("keep\nold", "keep\nnew\nmore").unwrap());
        let left: Vec<_> = view.left.iter().map(|l| (l.mark, l.text.as_str())).collect();
        let right: Vec<_> = view.right.iter().map(|l| (l.mark, l.text.as_str())).collect();
        assert_eq!(left, vec![(LineMark::Unchanged, "keep"), (LineMark::Removed, "old")]);
        assert_eq!(
            right,
            vec![
                (LineMark::Unchanged, "keep"),
                (LineMark::Added, "new"),
                (LineMark::Added, "more"),
            ]
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_html_never_contains_raw_markup_from_content() {
        let view = render(&diff_text("<b>a</b>", "<img src=x onerror=\"boom()\">").unwrap());
        let html = view.to_html();
        assert!(!html.contains("<b>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("<span class=\"line del\">- &lt;b&gt;a&lt;/b&gt;</span>"));
        assert!(html.contains("<span class=\"line add\">+ &lt;img"));
    }

    #[test]
    fn test_file_html_escapes_name_in_attribute() {
        let html = render_file_html("a\"><x>.rs", false, &SideBySide::default());
        assert!(html.contains("data-name=\"a&quot;&gt;&lt;x&gt;.rs\""));
        assert!(!html.contains(" checked"));
        let html = render_file_html("ok.rs", true, &SideBySide::default());
        assert!(html.contains(" checked"));
    }

    #[test]
    fn test_terminal_rows_pad_shorter_column() {
        let view = render(&diff_text("a\nb", "a").unwrap());
        let text = view.to_terminal(6);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["  a    │   a", "- b    │ "]);
    }

    #[test]
    fn test_terminal_clips_wide_characters() {
        assert_eq!(fit_width("日本語", 4), "日本");
        assert_eq!(fit_width("ab", 4), "ab  ");
    }
}
