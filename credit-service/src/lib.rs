//! Credit Service - Prepaid AI credits: ledger, reservations, pricing and admin audit.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::CreditServices;
