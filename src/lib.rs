//! Scheduled jobs for the blood-donation community platform: the campaign
//! digest mailer and the weekly Discord statistics, exposed as cron endpoints
//! gated by a shared secret.

pub mod config;
pub mod db;
pub mod digest;
pub mod discord;
pub mod jobs;
pub mod mailer;
pub mod model;
pub mod phone;
pub mod server;
pub mod stats;
