//! Text line layout for pens with text.

use super::Pen;

/// Font size assumed when a pen sets none.
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Average glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f64 = 0.6;

/// Recompute `calculative.text_lines` from `text`.
///
/// Explicit newlines always break. Unless `whiteSpace` is `"nowrap"`, words
/// are wrapped greedily to the pen's width using an average glyph advance.
pub fn calc_text_lines(pen: &mut Pen) {
    pen.calculative.text = pen.text.clone();
    let Some(text) = pen.text.as_deref() else {
        pen.calculative.text_lines.clear();
        return;
    };

    let nowrap = pen
        .extra
        .get("whiteSpace")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s == "nowrap");
    let font_size = pen
        .extra
        .get("fontSize")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_FONT_SIZE);
    let max_chars = if nowrap || pen.width <= 0.0 {
        usize::MAX
    } else {
        ((pen.width / (font_size * GLYPH_ADVANCE)).floor() as usize).max(1)
    };

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph, max_chars, &mut lines);
    }
    pen.calculative.text_lines = lines;
}

fn wrap_paragraph(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    if paragraph.chars().count() <= max_chars {
        out.push(paragraph.to_string());
        return;
    }
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    out.push(current);
}
