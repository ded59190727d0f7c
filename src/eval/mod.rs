//! Evaluation harness: EM/EX metrics over Spider-style datasets.

pub mod benchmark;
pub mod dataset;
pub mod report;

pub use benchmark::{
    evaluate, evaluate_path, exact_match, execution_accuracy, resolve_db_path, AggregateMetrics,
    BenchmarkOptions, BenchmarkResult,
};
pub use dataset::{load_dataset, BenchmarkItem};
pub use report::{
    console_table, csv_table, markdown_table, run_multi_provider, write_details, ComparisonReport,
};
