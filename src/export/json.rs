use super::{ExportError, MovementRow};

/// Array of `{date, product, user, previous_state, new_state}` objects.
pub fn render(rows: &[MovementRow]) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec_pretty(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sample_rows;

    #[test]
    fn array_of_objects_in_row_order() {
        let rows = sample_rows(2);
        let value: serde_json::Value = serde_json::from_slice(&render(&rows).unwrap()).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["product"], "Product 0");
        assert_eq!(items[1]["previous_state"], "Available");
        assert_eq!(items[1]["date"], "2024-03-27 10:00");
    }
}
