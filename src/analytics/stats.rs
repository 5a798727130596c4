use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use super::filter::FilterCriteria;
use super::round_to;
use crate::config::{ReportingConfig, StaffMember};
use crate::records::{payment_method_label, AttendanceRecord, Category, PAYMENT_METHODS};

pub const SERIES_DAYS: u32 = 30;
pub const TOP_PRODUCTS_LIMIT: usize = 10;
pub const ALL_PERIODS_LABEL: &str = "Todos os períodos";

/// Headline metrics of a record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total: usize,
    pub sales_concluded: usize,
    /// Sum of sale values, rounded to cents.
    pub total_value: f64,
    /// Percentage with one decimal; zero for an empty set.
    pub conversion_rate: f64,
}

impl Metrics {
    pub fn of(records: &[&AttendanceRecord]) -> Self {
        let total = records.len();
        let sales_concluded = sales_concluded_count(records);
        Self {
            total,
            sales_concluded,
            total_value: total_sale_value(records),
            conversion_rate: conversion_rate(sales_concluded, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    /// Stored value the rows were matched on (staff id or channel).
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(flatten)]
    pub metrics: Metrics,
    pub average_per_day: f64,
    pub by_staff: Vec<Breakdown>,
    pub by_channel: Vec<Breakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCount {
    pub product: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopProducts {
    pub sold: Vec<ProductCount>,
    pub interest: Vec<ProductCount>,
}

/// One slice of a distribution over a fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub value: String,
    pub label: String,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

pub fn sales_concluded_count(records: &[&AttendanceRecord]) -> usize {
    records.iter().filter(|r| r.is_sale_concluded()).count()
}

pub fn total_sale_value(records: &[&AttendanceRecord]) -> f64 {
    round_to(records.iter().map(|r| r.sale_value()).sum(), 2)
}

pub fn conversion_rate(concluded: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(concluded as f64 / total as f64 * 100.0, 1)
}

/// Mean number of records over the UTC days that have at least one record.
pub fn average_per_day(records: &[&AttendanceRecord]) -> f64 {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for date in records.iter().filter_map(|r| r.created_date()) {
        *per_day.entry(date).or_default() += 1;
    }
    if per_day.is_empty() {
        return 0.0;
    }
    let dated: usize = per_day.values().sum();
    round_to(dated as f64 / per_day.len() as f64, 1)
}

// ---------------------------------------------------------------------------
// Breakdowns
// ---------------------------------------------------------------------------

/// One row per roster member, regardless of category, zero rows included.
pub fn staff_breakdown(records: &[&AttendanceRecord], roster: &[StaffMember]) -> Vec<Breakdown> {
    roster
        .iter()
        .map(|member| {
            let mine: Vec<&AttendanceRecord> = records
                .iter()
                .copied()
                .filter(|r| r.staff() == Some(member.id.as_str()))
                .collect();
            Breakdown {
                key: member.id.clone(),
                label: member.label.clone(),
                metrics: Metrics::of(&mine),
            }
        })
        .collect()
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One row per configured channel that has at least one record.
pub fn channel_breakdown(records: &[&AttendanceRecord], channels: &[String]) -> Vec<Breakdown> {
    channels
        .iter()
        .filter_map(|channel| {
            let mine: Vec<&AttendanceRecord> = records
                .iter()
                .copied()
                .filter(|r| r.channel() == Some(channel.as_str()))
                .collect();
            if mine.is_empty() {
                return None;
            }
            Some(Breakdown {
                key: channel.clone(),
                label: capitalize(channel),
                metrics: Metrics::of(&mine),
            })
        })
        .collect()
}

pub fn summarize(records: &[&AttendanceRecord], reporting: &ReportingConfig) -> Summary {
    Summary {
        metrics: Metrics::of(records),
        average_per_day: average_per_day(records),
        by_staff: staff_breakdown(records, &reporting.roster),
        by_channel: channel_breakdown(records, &reporting.channels),
    }
}

// ---------------------------------------------------------------------------
// Series and rankings
// ---------------------------------------------------------------------------

/// Record counts for the `days` UTC days ending with `today`, oldest first.
/// Days without records appear with a zero count.
pub fn daily_series(records: &[&AttendanceRecord], today: NaiveDate, days: u32) -> Vec<DailyCount> {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for date in records.iter().filter_map(|r| r.created_date()) {
        *per_day.entry(date).or_default() += 1;
    }
    (0..days)
        .rev()
        .map(|back| {
            let date = today - Duration::days(i64::from(back));
            DailyCount {
                date,
                count: per_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// Tally in first-seen order, then a stable sort by descending count.
fn rank<'a>(values: impl Iterator<Item = &'a str>, limit: usize) -> Vec<ProductCount> {
    let mut ranked: Vec<ProductCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for value in values {
        match index.get(value) {
            Some(&i) => ranked[i].count += 1,
            None => {
                index.insert(value, ranked.len());
                ranked.push(ProductCount {
                    product: value.to_string(),
                    count: 1,
                });
            }
        }
    }
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}

pub fn top_products(records: &[&AttendanceRecord], limit: usize) -> TopProducts {
    TopProducts {
        sold: rank(records.iter().filter_map(|r| r.product_sold()), limit),
        interest: rank(records.iter().filter_map(|r| r.product_of_interest()), limit),
    }
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

pub fn category_distribution(records: &[&AttendanceRecord]) -> Vec<Slice> {
    Category::ALL
        .iter()
        .map(|&category| Slice {
            value: category.as_str().to_string(),
            label: category.label().to_string(),
            count: records.iter().filter(|r| r.category == category).count(),
        })
        .collect()
}

/// Sub-type counts of one category, in vocabulary order.
pub fn sub_type_distribution(records: &[&AttendanceRecord], category: Category) -> Vec<Slice> {
    category
        .sub_types()
        .iter()
        .map(|choice| Slice {
            value: choice.value.to_string(),
            label: choice.label.to_string(),
            count: records
                .iter()
                .filter(|r| r.category == category && r.sub_type() == Some(choice.value))
                .count(),
        })
        .collect()
}

/// Channel counts of one category, in vocabulary order.
pub fn channel_distribution(records: &[&AttendanceRecord], category: Category) -> Vec<Slice> {
    category
        .channels()
        .iter()
        .map(|choice| Slice {
            value: choice.value.to_string(),
            label: choice.label.to_string(),
            count: records
                .iter()
                .filter(|r| r.category == category && r.channel() == Some(choice.value))
                .count(),
        })
        .collect()
}

/// Cashier payment methods in vocabulary order; unknown methods are
/// appended after the known ones in first-seen order.
pub fn payment_method_distribution(records: &[&AttendanceRecord]) -> Vec<Slice> {
    let mut slices: Vec<Slice> = PAYMENT_METHODS
        .iter()
        .map(|choice| Slice {
            value: choice.value.to_string(),
            label: choice.label.to_string(),
            count: 0,
        })
        .collect();
    for method in records
        .iter()
        .filter(|r| r.category == Category::Cashier)
        .filter_map(|r| r.payment_method())
    {
        match slices.iter_mut().find(|s| s.value == method) {
            Some(slice) => slice.count += 1,
            None => slices.push(Slice {
                value: method.to_string(),
                label: payment_method_label(method).unwrap_or(method).to_string(),
                count: 1,
            }),
        }
    }
    slices
}

/// `dd/mm/yyyy a dd/mm/yyyy` when both date bounds are set.
pub fn period_label(criteria: &FilterCriteria) -> String {
    match (criteria.start_date, criteria.end_date) {
        (Some(start), Some(end)) => format!(
            "{} a {}",
            start.format("%d/%m/%Y"),
            end.format("%d/%m/%Y")
        ),
        _ => ALL_PERIODS_LABEL.to_string(),
    }
}
