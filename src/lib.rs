pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod routes;
pub mod store;
pub mod utils;

pub use routes::{router, AppContext};
