//! Integration-style tests against in-memory SQLite, the in-memory retriever
//! and a scripted language model.

mod common;
mod involvement_test;
mod pipeline_test;
mod workflow_test;
