//! Read-only views derived from registry contents.
//!
//! Projections are pure functions of the records they are given; the store
//! memoizes the grouped view on the registry version.

use serde::Serialize;

use crate::models::Record;

/// Records that fall on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGroup<R> {
    /// ISO calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub records: Vec<R>,
}

/// Sorts records ascending by timestamp, breaking ties by id.
pub fn sort_by_date<R: Record>(mut records: Vec<R>) -> Vec<R> {
    records.sort_by(|a, b| a.date().cmp(&b.date()).then_with(|| a.id().cmp(b.id())));
    records
}

/// Buckets records by calendar day.
///
/// Buckets come out in ascending date order, and records within a bucket
/// keep the order produced by [`sort_by_date`].
pub fn group_by_date<R: Record>(records: Vec<R>) -> Vec<DateGroup<R>> {
    let mut groups: Vec<DateGroup<R>> = Vec::new();

    for record in sort_by_date(records) {
        let key = record.date().date().format("%Y-%m-%d").to_string();
        match groups.last_mut() {
            Some(group) if group.date == key => group.records.push(record),
            _ => groups.push(DateGroup {
                date: key,
                records: vec![record],
            }),
        }
    }

    groups
}
