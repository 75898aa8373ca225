//! Relaymail Core - Batch send pipeline and delivery-status engine
//!
//! This crate implements the send pipeline (validation, dedup, suppression,
//! rate limiting, dispatch) and the asynchronous reconciliation of delivery
//! outcomes back into per-batch rollup counters.

pub mod batch;
pub mod dispatch;
pub mod pipeline;
pub mod reconcile;
pub mod tracking;
pub mod webhooks;

pub use batch::BatchAccountant;
pub use dispatch::{DispatchWorker, Dispatcher, EmailProvider, HttpProvider};
pub use pipeline::{BatchPipeline, BatchSubmission, PipelineError, SubmissionOutcome};
pub use reconcile::{DeliveryStatusReconciler, ProviderEnvelope, ProviderNotification};
pub use tracking::{LinkTracker, ShortLinkClient};
pub use webhooks::WebhookNotifier;
