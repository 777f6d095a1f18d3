pub mod incidents;
pub mod merge_suggestions;
