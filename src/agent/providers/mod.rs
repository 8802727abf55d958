//! Concrete [`ModelClient`](super::ModelClient) implementations.

pub mod openai;

pub use openai::OpenAiCompatClient;
