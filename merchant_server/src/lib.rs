//! # Merchant payment server
//! This crate hosts the HTTP server that fronts the reconciliation engine. It is responsible for:
//! Listening for signed webhook notifications from the payment gateway.
//! Maintaining the real-time notification stream and funnelling its events into the same engine.
//! Exposing the storefront API for creating invoices and querying payment state and balances.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/payment`: The signed webhook route for payment notifications.
//! * `/api/payments/create-invoice`: Create an invoice on the gateway and seed the matching order.
//! * `/api/payments/{id}/status`: The state of a payment, by order id or invoice id.
//! * `/api/users/{user_id}/balance`: The user's confirmed USD balance.
//! * `/api/users/{user_id}/payments`: The user's orders, newest first.
//! * `/api/orders/{order_id}/cancel`: Cancel a pending order.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod gateway;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod signature;
pub mod stream;

#[cfg(test)]
mod endpoint_tests;
