pub mod api;
pub mod enrichment;
pub mod poetry;
pub mod user;
