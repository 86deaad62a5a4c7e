pub mod checkout;
pub mod cron;
pub mod reservations;
pub mod root;
pub mod webhooks;
