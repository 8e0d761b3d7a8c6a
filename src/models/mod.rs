mod merchant;
mod payment;
mod webhook;

pub use merchant::{CreateMerchant, Merchant};
pub use payment::{CreatePayment, Payment, PaymentStatus, Refund, RefundStatus};
pub use webhook::{CreateWebhookEndpoint, UpdateWebhookEndpoint, WebhookAttempt, WebhookEndpoint};
