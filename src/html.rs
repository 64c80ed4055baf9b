// Small helpers shared by the page parsers. Banner cells are full of
// newlines, &nbsp; and stray padding, so everything goes through cell_text.

use scraper::{ElementRef, Html, Selector};

pub fn parse_document(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}

/// Text of an element with all whitespace runs collapsed to one space.
pub fn cell_text(element: &ElementRef) -> String {
    let text = element.text().collect::<String>();
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Text of every `td` in a row, in document order.
pub fn row_cells(row: &ElementRef, cell_selector: &Selector) -> Vec<String> {
    row.select(cell_selector).map(|cell| cell_text(&cell)).collect()
}

/// Text of the first match, or an empty string.
pub fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(|element| cell_text(&element))
        .unwrap_or_default()
}

/// Cell `i`, or "" if the row is short.
pub fn cell(cells: &[String], i: usize) -> &str {
    cells.get(i).map(String::as_str).unwrap_or("")
}

/// Lenient float: "85%", " 1,204 ", "3.50" all parse; anything else is 0.
pub fn parse_f64(text: &str) -> f64 {
    text.trim()
        .trim_end_matches('%')
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.)
}

/// Lenient count: "12" and "12.0" parse; anything else is 0.
pub fn parse_u32(text: &str) -> u32 {
    let text = text.trim().replace(',', "");

    text.parse::<u32>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|v| *v >= 0.).map(|v| v as u32))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_degrade_to_zero() {
        assert_eq!(parse_f64("85%"), 85.);
        assert_eq!(parse_f64(" 3.50 "), 3.5);
        assert_eq!(parse_f64(""), 0.);
        assert_eq!(parse_f64("N/A"), 0.);
        assert_eq!(parse_u32("1,204"), 1204);
        assert_eq!(parse_u32("12.0"), 12);
        assert_eq!(parse_u32("-"), 0);
    }

    #[test]
    fn cell_text_collapses_whitespace() {
        let document = Html::parse_fragment("<p>\n  John\u{a0} Smith\n (<abbr>P</abbr>) </p>");
        let p = Selector::parse("p").unwrap();
        assert_eq!(first_text(&document, &p), "John Smith (P)");
    }
}
