pub mod aggregate;
pub mod audit;
pub mod batch;
pub mod cells;
pub mod config;
pub mod engine;
pub mod index;
pub mod lock;
pub mod mapper;
pub mod paths;
pub mod period;
pub mod reconcile;
pub mod record;
pub mod source;
pub mod util;
