// Query engine module
// Aggregation requests, index resolution and filter cross-products
//
// Numan Thabit 2025 Nov

pub mod aggregation;
pub mod combinations;
pub mod index;

pub use aggregation::{
    run_aggregation, AggregationQuery, AggregationResult, ExactFilters, TimeRange, TimeWindow,
};
pub use combinations::{
    for_each_combination, for_each_combination_with, Combination, CrossProduct, Dimensions,
    FieldValues, FixedValues,
};
pub use index::{resolve_latest_index, IndexSelector};
