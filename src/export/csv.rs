use super::{ExportError, MovementRow, HEADERS};

/// Header line plus one record per movement.
pub fn render(rows: &[MovementRow]) -> Result<Vec<u8>, ExportError> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sample_rows;

    #[test]
    fn one_line_per_movement_after_header() {
        let rows = sample_rows(3);
        let text = String::from_utf8(render(&rows).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Date,Product,User,Previous State,New State");
        assert_eq!(lines[1], "2024-03-28 10:00,Product 0,ana,Available,Loaned");
    }

    #[test]
    fn quotes_fields_with_commas() {
        let mut rows = sample_rows(1);
        rows[0].product = "Cable, HDMI".to_string();
        let text = String::from_utf8(render(&rows).unwrap()).unwrap();
        assert!(text.contains("\"Cable, HDMI\""));
    }
}
