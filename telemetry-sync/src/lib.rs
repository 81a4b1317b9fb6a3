pub mod api;
pub mod config;
pub mod error;
pub mod metrics_server;
pub mod observability;
pub mod reconcile;
pub mod store;
pub mod timeseries;

#[cfg(test)]
mod test_support;

pub use reconcile::Reconciler;
