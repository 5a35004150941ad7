mod api;

pub use api::ReconciliationApi;
