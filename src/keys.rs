use crate::domain::{DatasetRecord, RecordSet};

pub fn key_columns(set: &RecordSet, minimal: bool, ignore_facets: &[String]) -> Vec<String> {
    let mut columns = Vec::new();
    for column in set.columns() {
        if ignore_facets.iter().any(|ignored| ignored == column) {
            continue;
        }
        if minimal {
            let mut values = set.records().iter().map(|record| record.facet(column));
            let first = values.next().unwrap_or(None);
            if values.all(|value| value == first) {
                continue;
            }
        }
        columns.push(column.clone());
    }
    columns
}

pub fn format_key(record: &DatasetRecord, columns: &[String], separator: &str) -> String {
    columns
        .iter()
        .map(|column| record.facet(column).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(separator)
}
