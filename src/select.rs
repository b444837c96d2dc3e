use std::collections::BTreeMap;

use crate::domain::{DatasetRecord, MemberId, RecordSet};
use crate::error::EsgfError;

pub type ModelGroup = (String, String, String);

fn facet_or_empty(record: &DatasetRecord, name: &str) -> String {
    record.facet(name).unwrap_or_default().to_string()
}

fn group_rows(set: &RecordSet) -> BTreeMap<ModelGroup, Vec<usize>> {
    let mut groups: BTreeMap<ModelGroup, Vec<usize>> = BTreeMap::new();
    for (row, record) in set.records().iter().enumerate() {
        let key = (
            facet_or_empty(record, "source_id"),
            facet_or_empty(record, "member_id"),
            facet_or_empty(record, "grid_label"),
        );
        groups.entry(key).or_default().push(row);
    }
    groups
}

pub fn model_group_counts(set: &RecordSet) -> BTreeMap<ModelGroup, usize> {
    group_rows(set)
        .into_iter()
        .map(|(key, rows)| (key, rows.len()))
        .collect()
}

pub fn remove_incomplete_groups<F>(set: &mut RecordSet, complete: F)
where
    F: Fn(&[&DatasetRecord]) -> bool,
{
    let mut doomed = vec![false; set.len()];
    for rows in group_rows(set).into_values() {
        let group = rows
            .iter()
            .map(|&row| &set.records()[row])
            .collect::<Vec<_>>();
        if !complete(&group) {
            for row in rows {
                doomed[row] = true;
            }
        }
    }
    let mut row = 0;
    set.retain(|_| {
        let keep = !doomed[row];
        row += 1;
        keep
    });
}

pub fn reduce_ensembles(set: &mut RecordSet) -> Result<(), EsgfError> {
    let mut members = Vec::with_capacity(set.len());
    let mut smallest: BTreeMap<String, MemberId> = BTreeMap::new();
    for record in set.records() {
        let member = record.member_id()?;
        members.push(member);
        smallest
            .entry(facet_or_empty(record, "source_id"))
            .and_modify(|current| {
                if member < *current {
                    *current = member;
                }
            })
            .or_insert(member);
    }
    let mut row = 0;
    set.retain(|record| {
        let keep = match smallest.get(record.facet("source_id").unwrap_or_default()) {
            Some(minimum) => members[row] == *minimum,
            None => true,
        };
        row += 1;
        keep
    });
    Ok(())
}
