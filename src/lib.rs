// src/lib.rs

//! Leiaute Monitor Library
//!
//! Watches the Banco Central do Brasil leiaute pages for new or changed
//! documents and reports them by email.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
