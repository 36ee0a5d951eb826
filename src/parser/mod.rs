pub mod filter_evaluator;
pub mod filter_operator;
pub mod filter_parser;

pub use filter_evaluator::FilterEvaluator;
pub use filter_operator::{FilterOp, ScimFilter};
pub use filter_parser::parse_filter;
