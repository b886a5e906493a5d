pub mod ai_gateway;
pub mod auth;
pub mod enrichment;
pub mod poetry;
pub mod prompts;
pub mod storage;
