//! Shared data types for Plant Share: the photo record, feed queries,
//! HTTP payloads and live feed events.

pub mod api;
pub mod events;
pub mod models;
