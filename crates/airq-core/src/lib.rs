//! Core data types, AQI calculation, and forecasting for the air quality pipeline
//!
//! Everything in this crate is pure: the AQI engine and forecast generator
//! never touch storage. Persistence is reached only through the traits in
//! [`store`], which the storage crate implements.

pub mod aqi;
pub mod forecast;
pub mod params;
pub mod store;
pub mod types;

pub use aqi::*;
pub use forecast::*;
pub use params::*;
pub use store::*;
pub use types::*;
