pub mod cardinality;
pub mod data_validator;
pub mod date_filter;
pub mod populate;
pub mod schema_validator;
pub mod search_filter;
pub mod views;

pub use cardinality::{check_candidate, check_cardinality, check_compatibility};
pub use data_validator::{validate_data_against_schema, validate_instance_data};
pub use date_filter::parse_date_filter;
pub use populate::{populate, populate_one, PopulateError, PopulateStage, PopulateTarget};
pub use schema_validator::validate_schema_definition;
pub use search_filter::build_search_filter;
