pub mod generate;
pub mod health;
pub mod metrics_handler;

pub use generate::{handle_generate, AppState, GenerateResponse, TokenMetrics, GENERATE_ENDPOINT};
