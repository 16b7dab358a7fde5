#![allow(warnings)]

pub mod apis;
pub mod cache;
pub mod catalog; // Item search index
pub mod config;
pub mod errors; // Structured fetch error taxonomy
pub mod service;
