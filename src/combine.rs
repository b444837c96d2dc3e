use std::collections::{BTreeMap, HashSet};

use crate::domain::{DatasetRecord, RecordSet};

pub fn combine_results(result_sets: Vec<Vec<DatasetRecord>>) -> RecordSet {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_content: HashSet<(BTreeMap<String, String>, String)> = HashSet::new();
    let mut combined = Vec::new();
    for records in result_sets {
        for record in records {
            if !seen_ids.insert(record.id.clone()) {
                continue;
            }
            if !seen_content.insert((record.facets.clone(), record.version.clone())) {
                continue;
            }
            combined.push(record);
        }
    }
    RecordSet::from_records(combined)
}
