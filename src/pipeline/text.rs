//! Plain-text layout: paginate a `.txt` file onto A4 pages.
//!
//! The layout is intentionally naive and must stay that way, since callers
//! depend on exactly where lines wrap:
//!
//! * Width is estimated as `chars × FONT_SIZE × 0.5`, not real glyph metrics.
//! * Words are split on single spaces and appended greedily. A word that
//!   would push the line past [`USABLE_WIDTH`] flushes the current line first,
//!   unless the line is empty, so an over-long word is placed whole.
//! * Every source line (split on `\n`) starts a fresh visual line; wrapping
//!   never joins two source lines. A source line with no words draws nothing
//!   and consumes no vertical space.
//! * Before each line is drawn, a cursor below the bottom margin starts a
//!   new page. A source line simply continues at the current cursor.

use crate::error::StrategyError;
use crate::pipeline::pdf::{op_int, PdfBuilder};
use crate::store;
use lopdf::content::Operation;
use lopdf::{dictionary, Object};
use std::path::Path;
use tracing::debug;

pub const PAGE_WIDTH: i64 = 595;
pub const PAGE_HEIGHT: i64 = 842;
pub const MARGIN: i64 = 50;
pub const USABLE_WIDTH: i64 = PAGE_WIDTH - 2 * MARGIN;
pub const FONT_SIZE: i64 = 12;
pub const LINE_HEIGHT: i64 = FONT_SIZE + 2;

/// Lines that fit between the top cursor and the bottom margin, inclusive.
pub const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT + 1) as usize;

const FONT_RESOURCE: &str = "F1";

/// One drawn line: its baseline `y` and the text on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub y: i64,
    pub text: String,
}

/// The lines drawn on one page, top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

/// Estimated rendered width of `line` in points.
pub fn estimated_width(line: &str) -> f64 {
    line.chars().count() as f64 * FONT_SIZE as f64 * 0.5
}

struct Cursor {
    pages: Vec<PageLayout>,
    y: i64,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn draw(&mut self, text: String) {
        if self.y < MARGIN {
            self.pages.push(PageLayout::default());
            self.y = PAGE_HEIGHT - MARGIN;
        }
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(PlacedLine { y, text });
        }
        self.y -= LINE_HEIGHT;
    }
}

/// Compute the page layout for `text`. Always returns at least one page.
pub fn layout_pages(text: &str) -> Vec<PageLayout> {
    let mut cursor = Cursor::new();

    for source_line in text.split('\n') {
        let source_line = source_line.strip_suffix('\r').unwrap_or(source_line);
        let mut current = String::new();

        for word in source_line.split(' ') {
            let tentative = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if estimated_width(&tentative) > USABLE_WIDTH as f64 && !current.is_empty() {
                cursor.draw(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = tentative;
            }
        }

        if !current.is_empty() {
            cursor.draw(current);
        }
    }

    cursor.pages
}

/// Encode for the standard Helvetica font under WinAnsiEncoding.
///
/// Latin-1 maps directly, the common Windows-1252 punctuation is translated,
/// tabs become spaces, and anything else becomes `?`.
pub fn encode_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

fn page_operations(page: &PageLayout) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(page.lines.len() * 4 + 2);
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![FONT_RESOURCE.into(), Object::Integer(FONT_SIZE)],
    ));
    for line in &page.lines {
        // Absolute placement keeps each line independent of the previous one.
        ops.push(op_int("Tm", &[1, 0, 0, 1, MARGIN, line.y]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(&line.text))],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Render laid-out pages to PDF bytes.
pub fn render_pages(pages: &[PageLayout]) -> std::io::Result<Vec<u8>> {
    let mut builder = PdfBuilder::new();
    let font_id = builder.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    for page in pages {
        let resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => font_id },
        };
        builder.add_page(PAGE_WIDTH, PAGE_HEIGHT, resources, page_operations(page))?;
    }

    builder.finish()
}

/// Text strategy: lay out `input` and write the PDF to `output`.
pub fn layout_text(input: &Path, output: &Path) -> Result<(), StrategyError> {
    let raw = std::fs::read(input)
        .map_err(|e| StrategyError::io("Failed to read input", input, e))?;
    let text = String::from_utf8_lossy(&raw);

    let pages = layout_pages(&text);
    let line_count: usize = pages.iter().map(|p| p.lines.len()).sum();
    debug!(
        "Laid out {} lines on {} pages for {}",
        line_count,
        pages.len(),
        input.display()
    );

    let bytes = render_pages(&pages)
        .map_err(|e| StrategyError::io("Failed to build PDF", output, e))?;
    store::persist_bytes(output, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pdf::inspect;

    fn all_lines(pages: &[PageLayout]) -> Vec<&PlacedLine> {
        pages.iter().flat_map(|p| p.lines.iter()).collect()
    }

    #[test]
    fn geometry_constants() {
        assert_eq!(USABLE_WIDTH, 495);
        assert_eq!(LINE_HEIGHT, 14);
        assert_eq!(LINES_PER_PAGE, 54);
    }

    #[test]
    fn three_short_lines_fit_one_page() {
        let pages = layout_pages("alpha\nbeta\ngamma");
        assert_eq!(pages.len(), 1);
        let ys: Vec<i64> = pages[0].lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![792, 778, 764]);
        assert_eq!(pages[0].lines[2].text, "gamma");
    }

    #[test]
    fn wrap_boundary_is_82_chars() {
        // 82 chars × 6pt = 492 ≤ 495; 83 chars = 498 > 495.
        let line = format!("{} {}", "a".repeat(40), "b".repeat(41));
        assert_eq!(line.chars().count(), 82);
        let pages = layout_pages(&line);
        assert_eq!(pages[0].lines.len(), 1);

        let line = format!("{} {}", "a".repeat(40), "b".repeat(42));
        let pages = layout_pages(&line);
        let texts: Vec<&str> = pages[0].lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a".repeat(40), "b".repeat(42)]);
    }

    #[test]
    fn overlong_word_is_placed_whole() {
        let word = "x".repeat(200);
        let pages = layout_pages(&format!("hi {word} there"));
        let texts: Vec<&str> = all_lines(&pages).iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", word.as_str(), "there"]);
    }

    #[test]
    fn drawn_lines_fit_unless_single_word() {
        let text = "lorem ipsum dolor sit amet consectetur ".repeat(200);
        let pages = layout_pages(&text);
        for line in all_lines(&pages) {
            assert!(
                estimated_width(&line.text) <= USABLE_WIDTH as f64 || !line.text.contains(' '),
                "line too wide: {:?}",
                line.text
            );
        }
    }

    #[test]
    fn source_lines_never_merge() {
        let pages = layout_pages("a\nb");
        let texts: Vec<&str> = all_lines(&pages).iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn blank_lines_consume_no_space() {
        let pages = layout_pages("a\n\n\nb\r\n");
        let ys: Vec<i64> = pages[0].lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![792, 778]);
    }

    #[test]
    fn spaces_are_preserved_inside_a_line() {
        let pages = layout_pages("  a  b");
        assert_eq!(pages[0].lines[0].text, "a  b");
    }

    #[test]
    fn page_breaks_after_54_lines() {
        let text = (0..LINES_PER_PAGE * 2 + 1)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        let pages = layout_pages(&text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].lines.len(), LINES_PER_PAGE);
        assert_eq!(pages[0].lines.last().map(|l| l.y), Some(MARGIN));
        assert_eq!(pages[1].lines[0].y, PAGE_HEIGHT - MARGIN);
        assert_eq!(pages[2].lines.len(), 1);
    }

    #[test]
    fn page_capacity_covers_wrapped_lines() {
        let text = "word ".repeat(5000);
        let pages = layout_pages(&text);
        let drawn = all_lines(&pages).len();
        assert!(pages.len() * LINES_PER_PAGE >= drawn);
        assert!(all_lines(&pages).iter().all(|l| l.y >= MARGIN));
    }

    #[test]
    fn empty_text_yields_one_blank_page() {
        let pages = layout_pages("");
        assert_eq!(pages.len(), 1);
        assert!(pages[0].lines.is_empty());
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(encode_win_ansi("A\té€—中"), vec![b'A', b' ', 0xE9, 0x80, 0x97, b'?']);
    }

    #[test]
    fn layout_text_writes_readable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        let output = dir.path().join("notes.pdf");
        std::fs::write(&input, "first (line)\nsecond\nthird").unwrap();

        layout_text(&input, &output).unwrap();

        let doc = inspect::load(&std::fs::read(&output).unwrap());
        assert_eq!(inspect::page_sizes(&doc), vec![(595, 842)]);
        assert_eq!(
            inspect::page_strings(&doc, 1),
            vec![b"first (line)".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    #[test]
    fn unreadable_input_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = layout_text(&dir.path().join("missing.txt"), &dir.path().join("o.pdf"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IoFailure);
        assert!(!dir.path().join("o.pdf").exists());
    }
}
