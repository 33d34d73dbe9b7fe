pub mod config;
pub mod errors;
pub mod generator;
pub mod imaging;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod terminal;
pub mod vocab;
