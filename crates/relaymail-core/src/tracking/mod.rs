//! Open/click tracking - link rewriting through the short-link provider

pub mod links;

pub use links::{LinkMetadata, LinkTracker, ShortLink, ShortLinkClient};
