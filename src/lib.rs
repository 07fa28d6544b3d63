//! GateFlow - checkout backend with race-safe coupon reservations
//!
//! The interesting part lives in [`coupons`]: a reservation manager that
//! keeps limited-use discount coupons correct under concurrent checkouts.
//! The rest is the service around it - catalog, checkout sessions, the
//! payment provider client, and the HTTP surface.

pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
