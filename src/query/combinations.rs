// Cross-product enumeration of filter dimensions
// This file discovers the observed values of every filter field and walks
// the cartesian product of those value sets, one combination at a time
//
// Numan Thabit 2025 Nov

use super::aggregation::{AggregationQuery, ExactFilters, TimeWindow};
use crate::errors::ExporterError;
use crate::transport::DocumentStore;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::debug;

/// Filter dimensions, metric label -> document field. Iterated in label order.
pub type Dimensions = BTreeMap<String, String>;

/// Observed values of one dimension within the active window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValues {
    pub label: String,
    pub field: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

/// One concrete value per filter dimension, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Combination {
    assignments: BTreeMap<String, Filter>,
}

impl Combination {
    pub fn get(&self, label: &str) -> Option<&Filter> {
        self.assignments.get(label)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.assignments.iter().map(|(l, f)| (l.as_str(), f))
    }

    /// label -> value, as written into the gauge.
    pub fn label_values(&self) -> BTreeMap<String, String> {
        self.assignments
            .iter()
            .map(|(label, f)| (label.clone(), f.value.clone()))
            .collect()
    }

    /// field -> value, as sent to the store. Two labels on the same field
    /// collapse onto one term predicate.
    pub fn exact_filters(&self) -> ExactFilters {
        self.assignments
            .values()
            .map(|f| (f.field.clone(), f.value.clone()))
            .collect()
    }
}

/// Iterative odometer over the value sets; the last dimension varies fastest.
///
/// Every item is an owned [`Combination`], so callers may keep it as long as
/// they like. An empty dimension list or any empty value set yields nothing.
#[derive(Debug, Clone)]
pub struct CrossProduct<'a> {
    domains: &'a [FieldValues],
    cursor: Vec<usize>,
    exhausted: bool,
}

impl<'a> CrossProduct<'a> {
    pub fn new(domains: &'a [FieldValues]) -> Self {
        let exhausted = domains.is_empty() || domains.iter().any(|d| d.values.is_empty());
        Self {
            domains,
            cursor: vec![0; domains.len()],
            exhausted,
        }
    }

    /// Number of combinations the full walk produces, or `None` when it
    /// does not fit in a `usize`.
    pub fn total(&self) -> Option<usize> {
        if self.domains.is_empty() {
            return Some(0);
        }
        self.domains
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.values.len()))
    }

    fn current(&self) -> Combination {
        let assignments = self
            .domains
            .iter()
            .zip(&self.cursor)
            .map(|(domain, &i)| {
                (
                    domain.label.clone(),
                    Filter {
                        field: domain.field.clone(),
                        value: domain.values[i].clone(),
                    },
                )
            })
            .collect();
        Combination { assignments }
    }

    fn advance(&mut self) {
        for pos in (0..self.cursor.len()).rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.domains[pos].values.len() {
                return;
            }
            self.cursor[pos] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for CrossProduct<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.exhausted {
            return None;
        }
        let combination = self.current();
        self.advance();
        Some(combination)
    }
}

/// Pinned value lists, metric label -> values. A pinned dimension is walked
/// over exactly these values and never queried for discovery.
pub type FixedValues = BTreeMap<String, Vec<String>>;

/// Discover each dimension's values with an unfiltered aggregation.
///
/// Values with no documents in the window are never discovered. Values are
/// sorted so the walk order is stable between passes.
pub async fn resolve_field_values<S>(
    store: &S,
    index: &str,
    dimensions: &Dimensions,
    window: &TimeWindow,
) -> Result<Vec<FieldValues>, ExporterError>
where
    S: DocumentStore + ?Sized,
{
    resolve_field_values_with(store, index, dimensions, &FixedValues::new(), window).await
}

/// Like [`resolve_field_values`], but dimensions listed in `fixed` take
/// their pinned values as given.
pub async fn resolve_field_values_with<S>(
    store: &S,
    index: &str,
    dimensions: &Dimensions,
    fixed: &FixedValues,
    window: &TimeWindow,
) -> Result<Vec<FieldValues>, ExporterError>
where
    S: DocumentStore + ?Sized,
{
    let mut all = Vec::with_capacity(dimensions.len());
    for (label, field) in dimensions {
        let values = match fixed.get(label) {
            Some(pinned) => pinned.clone(),
            None => {
                let result = AggregationQuery::new(field, window.clone())
                    .run(store, index, &ExactFilters::new())
                    .await
                    .map_err(|e| {
                        e.context(format!(
                            "failed to find field values for field={field} label={label}"
                        ))
                    })?;
                let mut values: Vec<String> = result.into_keys().collect();
                values.sort_unstable();
                values
            }
        };
        debug!(label = %label, field = %field, values = ?values, "resolved field values");
        all.push(FieldValues {
            label: label.clone(),
            field: field.clone(),
            values,
        });
    }
    Ok(all)
}

/// Invoke `on_combination` once per combination of the dimensions' observed
/// values, serially, and collect what each call returns.
///
/// Empty `dimensions` returns immediately without calling back. A failure
/// resolving any dimension aborts before the first callback.
pub async fn for_each_combination<S, F, Fut, T>(
    store: &S,
    index: &str,
    dimensions: &Dimensions,
    window: &TimeWindow,
    on_combination: F,
) -> Result<Vec<T>, ExporterError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Combination) -> Fut,
    Fut: Future<Output = T>,
{
    let fixed = FixedValues::new();
    for_each_combination_with(store, index, dimensions, &fixed, window, on_combination).await
}

/// [`for_each_combination`] with some dimensions pinned to fixed values.
pub async fn for_each_combination_with<S, F, Fut, T>(
    store: &S,
    index: &str,
    dimensions: &Dimensions,
    fixed: &FixedValues,
    window: &TimeWindow,
    mut on_combination: F,
) -> Result<Vec<T>, ExporterError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Combination) -> Fut,
    Fut: Future<Output = T>,
{
    if dimensions.is_empty() {
        return Ok(Vec::new());
    }

    let domains = resolve_field_values_with(store, index, dimensions, fixed, window).await?;
    let product = CrossProduct::new(&domains);
    debug!(combinations = ?product.total(), "walking cross-product");
    let mut outcomes = Vec::new();
    for combination in product {
        outcomes.push(on_combination(combination).await);
    }
    Ok(outcomes)
}
