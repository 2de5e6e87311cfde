pub mod client;
pub mod models;
pub mod signing;

pub use client::UpbitClient;
pub use signing::UpbitCredentials;
