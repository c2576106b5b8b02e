//! Report rendering.

pub mod generator;

pub use generator::{
    generate_batch_list, generate_json_report, generate_markdown_report, generate_review_summary,
    write_report, StatsReport,
};
