pub mod crypto;
pub mod query_string;
