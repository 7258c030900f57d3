use printpdf::lopdf;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Polygon, Rgb,
};

use super::{ExportError, MovementRow, HEADERS, REPORT_TITLE};

// A4 landscape
const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 15.0;
const LINE_HEIGHT: f32 = 4.0;
const ROW_PADDING: f32 = 4.0;
const TITLE_SIZE: f32 = 16.0;
const CELL_SIZE: f32 = 9.0;
const COLUMN_WIDTHS: [f32; 5] = [40.0, 80.0, 50.0, 48.0, 49.0];
// Characters per line at CELL_SIZE
const CELL_CHARS: [usize; 5] = [18, 42, 26, 24, 24];
// Builtin fonts are written with this encoding
const BUILTIN_ENCODING: &str = "WinAnsiEncoding";

fn grey() -> Color {
    Color::Rgb(Rgb::new(0.5, 0.5, 0.5, None))
}

fn white() -> Color {
    Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None))
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

/// Replaces characters the builtin fonts cannot encode, which would otherwise be dropped.
fn printable(text: &str) -> String {
    let mut buf = [0u8; 4];
    text.chars()
        .map(|ch| {
            let utf8 = ch.encode_utf8(&mut buf);
            if lopdf::Document::encode_text(Some(BUILTIN_ENCODING), utf8).is_empty() {
                '?'
            } else {
                ch
            }
        })
        .collect()
}

/// Splits `text` into lines of at most `width` visible characters, breaking
/// after spaces where possible. Concatenating the lines gives `text` back.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut len = 0;

    for word in text.split_inclusive(' ') {
        let visible = word.trim_end_matches(' ').chars().count();
        if len > 0 && len + visible > width {
            lines.push(std::mem::take(&mut line));
            len = 0;
        }
        for ch in word.chars() {
            if len >= width && ch != ' ' {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            line.push(ch);
            len += 1;
        }
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn row_height(cells: &[Vec<String>; 5]) -> f32 {
    let lines = cells.iter().map(Vec::len).max().unwrap_or(1);
    ROW_PADDING + lines as f32 * LINE_HEIGHT
}

fn wrapped_cells(cells: [&str; 5]) -> [Vec<String>; 5] {
    let mut i = 0;
    cells.map(|cell| {
        let lines = wrap(&printable(cell), CELL_CHARS[i]);
        i += 1;
        lines
    })
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

struct Table<'a> {
    doc: &'a PdfDocumentReference,
    fonts: Fonts,
    layer: PdfLayerReference,
    cursor: f32,
    page: usize,
}

impl<'a> Table<'a> {
    fn table_width() -> f32 {
        COLUMN_WIDTHS.iter().sum()
    }

    fn header(&mut self) {
        let cells = wrapped_cells(HEADERS);
        let top = self.cursor;
        let bottom = top - row_height(&cells);
        let right = MARGIN + Self::table_width();

        self.layer.set_fill_color(grey());
        self.layer.add_polygon(Polygon {
            rings: vec![vec![
                (Point::new(Mm(MARGIN), Mm(bottom)), false),
                (Point::new(Mm(right), Mm(bottom)), false),
                (Point::new(Mm(right), Mm(top)), false),
                (Point::new(Mm(MARGIN), Mm(top)), false),
            ]],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });

        self.layer.set_fill_color(white());
        self.text_row(&cells, true);
        self.layer.set_fill_color(black());
    }

    fn text_row(&mut self, cells: &[Vec<String>; 5], bold: bool) {
        let height = row_height(cells);
        let font = if bold { &self.fonts.bold } else { &self.fonts.regular };
        let mut x = MARGIN;
        for (lines, width) in cells.iter().zip(COLUMN_WIDTHS) {
            for (n, line) in lines.iter().enumerate() {
                let baseline = self.cursor - 1.5 - (n + 1) as f32 * LINE_HEIGHT;
                self.layer
                    .use_text(line.as_str(), CELL_SIZE, Mm(x + 1.5), Mm(baseline), font);
            }
            x += width;
        }
        self.grid_line(self.cursor - height);
        self.cursor -= height;
    }

    fn grid_line(&self, y: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(y)), false),
                (Point::new(Mm(MARGIN + Self::table_width()), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn column_lines(&self, top: f32) {
        let mut x = MARGIN;
        for width in COLUMN_WIDTHS.iter().copied().chain(std::iter::once(0.0)) {
            self.layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(x), Mm(top)), false),
                    (Point::new(Mm(x), Mm(self.cursor)), false),
                ],
                is_closed: false,
            });
            x += width;
        }
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Table");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.page += 1;
        self.cursor = PAGE_HEIGHT - MARGIN;
        self.layer.set_outline_color(black());
        self.layer.set_outline_thickness(0.3);
    }
}

/// Landscape table with a title, grey header band and cell grid; paginates as needed.
/// Long values wrap inside their cell and rows grow to fit.
pub fn render(rows: &[MovementRow]) -> Result<Vec<u8>, ExportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Table");
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
    };
    let layer = doc.get_page(first_page).get_layer(first_layer);
    layer.set_outline_color(black());
    layer.set_outline_thickness(0.3);

    let mut table = Table {
        doc: &doc,
        fonts,
        layer,
        cursor: PAGE_HEIGHT - MARGIN,
        page: 1,
    };

    table.layer.use_text(
        REPORT_TITLE,
        TITLE_SIZE,
        Mm(MARGIN),
        Mm(table.cursor - 6.0),
        &table.fonts.bold,
    );
    table.cursor -= 14.0;

    let mut top = table.cursor;
    table.grid_line(top);
    table.header();

    for row in rows {
        let cells = wrapped_cells(row.cells());
        if table.cursor - row_height(&cells) < MARGIN {
            table.column_lines(top);
            table.new_page();
            top = table.cursor;
            table.grid_line(top);
            table.header();
        }
        table.text_row(&cells, false);
    }
    table.column_lines(top);

    tracing::debug!(pages = table.page, rows = rows.len(), "pdf export rendered");

    doc.save_to_bytes()
        .map_err(|e| ExportError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sample_rows;

    /// Every string drawn with `Tj`, in drawing order.
    fn drawn_text(bytes: &[u8]) -> Vec<String> {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        let mut drawn = Vec::new();
        for page_id in doc.get_pages().into_values() {
            let data = doc.get_page_content(page_id).unwrap();
            let content = lopdf::content::Content::decode(&data).unwrap();
            for op in content.operations.iter().filter(|op| op.operator == "Tj") {
                if let Some(lopdf::Object::String(raw, _)) = op.operands.first() {
                    drawn.push(lopdf::Document::decode_text(Some(BUILTIN_ENCODING), raw));
                }
            }
        }
        drawn
    }

    #[test]
    fn long_history_spans_pages() {
        let bytes = render(&sample_rows(60)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn wrapping_keeps_every_character() {
        assert_eq!(wrap("short", 10), ["short"]);
        assert_eq!(wrap("", 10), [""]);
        assert_eq!(
            wrap("a very long product name", 10),
            ["a very ", "long ", "product ", "name"]
        );
        assert_eq!(wrap("abcdefghijkl", 5), ["abcde", "fghij", "kl"]);

        let name = "Microscope ".repeat(14);
        assert_eq!(wrap(&name, 42).concat(), name);
        assert!(wrap(&name, 42).iter().all(|l| l.trim_end().chars().count() <= 42));
    }

    #[test]
    fn latin_names_survive_and_unencodable_characters_are_marked() {
        assert_eq!(printable("José Peña"), "José Peña");
        assert_eq!(printable("Łódź"), "?ód?");
    }

    #[test]
    fn every_row_and_full_value_is_written() {
        let long_name = format!("{} José", "Spectrophotometer calibration kit ".repeat(4));
        let mut rows = sample_rows(3);
        rows[1].product = long_name.clone();

        let drawn = drawn_text(&render(&rows).unwrap());
        assert!(drawn.concat().contains(&long_name));
        assert_eq!(drawn.iter().filter(|t| *t == "Loaned").count(), rows.len());
        assert!(drawn.iter().any(|t| t == "Product 0"));
        assert!(drawn.iter().any(|t| t == "Product 2"));
        assert!(drawn.iter().any(|t| t == REPORT_TITLE));
    }
}
