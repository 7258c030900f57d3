use rust_xlsxwriter::{Format, Workbook};

use super::{ExportError, MovementRow, HEADERS};

const SHEET_NAME: &str = "Movements";
const COLUMN_WIDTHS: [f64; 5] = [18.0, 30.0, 20.0, 16.0, 16.0];

/// Single-sheet workbook with a bold header row.
pub fn render(rows: &[MovementRow]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, (title, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, &bold)?;
        sheet.set_column_width(col, width)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            sheet.write_string(r, col as u16, *cell)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
