//! Repository layer for data access

pub mod api_keys;
pub mod batches;
pub mod emails;
pub mod jobs;
pub mod suppressions;
pub mod templates;
pub mod webhooks;

pub use api_keys::ApiKeyRepository;
pub use batches::BatchRepository;
pub use emails::EmailRepository;
pub use jobs::JobRepository;
pub use suppressions::SuppressionRepository;
pub use templates::TemplateRepository;
pub use webhooks::{WebhookLogRepository, WebhookSubscriptionRepository};
