use std::collections::HashMap;
use std::convert::Infallible;

use serde::Serialize;

use crate::table::{DisplayValue, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub count: usize,
    pub percentage: u32,
}

impl Record for GroupSummary {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        match key {
            "key" => Some(self.key.as_str().into()),
            "count" => Some(self.count.into()),
            "percentage" => Some(format!("{}%", self.percentage).into()),
            _ => None,
        }
    }
}

/// `round(part / total * 100)`, or 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Share of records matching `predicate`, as a rounded percentage.
pub fn rate<R, P>(records: &[R], mut predicate: P) -> u32
where
    P: FnMut(&R) -> bool,
{
    let matching = records.iter().filter(|r| predicate(*r)).count();
    percentage(matching, records.len())
}

#[derive(Default)]
struct Tally {
    groups: Vec<(String, usize)>,
    slots: HashMap<String, usize>,
    total: usize,
}

impl Tally {
    fn add(&mut self, key: String) {
        self.total += 1;
        match self.slots.get(&key) {
            Some(&slot) => self.groups[slot].1 += 1,
            None => {
                self.slots.insert(key.clone(), self.groups.len());
                self.groups.push((key, 1));
            }
        }
    }

    fn finish(self) -> Vec<GroupSummary> {
        let total = self.total;
        let mut summaries: Vec<GroupSummary> = self
            .groups
            .into_iter()
            .map(|(key, count)| GroupSummary {
                key,
                count,
                percentage: percentage(count, total),
            })
            .collect();

        // stable: equal counts keep first-seen order
        summaries.sort_by(|a, b| b.count.cmp(&a.count));
        summaries
    }
}

/// Groups records by key and summarizes each group, largest first.
pub fn aggregate<R, F>(records: &[R], mut key_fn: F) -> Vec<GroupSummary>
where
    F: FnMut(&R) -> String,
{
    match try_aggregate(records, |r| Ok::<_, Infallible>(key_fn(r))) {
        Ok(summaries) => summaries,
        Err(never) => match never {},
    }
}

/// Like [`aggregate`], but the first key error aborts the whole run.
pub fn try_aggregate<R, E, F>(records: &[R], mut key_fn: F) -> Result<Vec<GroupSummary>, E>
where
    F: FnMut(&R) -> Result<String, E>,
{
    let mut tally = Tally::default();
    for record in records {
        tally.add(key_fn(record)?);
    }
    Ok(tally.finish())
}

/// Groups multi-valued keys: every key a record yields counts once.
/// Percentages are relative to the number of key occurrences.
pub fn aggregate_many<R, I, F>(records: &[R], mut keys_fn: F) -> Vec<GroupSummary>
where
    F: FnMut(&R) -> I,
    I: IntoIterator<Item = String>,
{
    let mut tally = Tally::default();
    for record in records {
        for key in keys_fn(record) {
            tally.add(key);
        }
    }
    tally.finish()
}

/// Appends zero-count groups for expected keys that never occurred.
pub fn with_zero_groups(mut summaries: Vec<GroupSummary>, expected: &[&str]) -> Vec<GroupSummary> {
    for key in expected {
        if !summaries.iter().any(|s| s.key == *key) {
            summaries.push(GroupSummary {
                key: key.to_string(),
                count: 0,
                percentage: 0,
            });
        }
    }
    summaries
}

pub fn total_count(summaries: &[GroupSummary]) -> usize {
    summaries.iter().map(|s| s.count).sum()
}
