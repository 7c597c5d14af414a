//! Socrata open-data portals.

mod client;

pub use client::{CHICAGO_CRASHES_ENDPOINT, SocrataCrashClient};
