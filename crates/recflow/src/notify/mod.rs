//! Outcome notifications, sent once per job after it reaches a terminal state.

pub mod pushover;

use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::watch;
use crate::config::{Config, PushoverConfig, Recipient};
use crate::entity::Entity;
use crate::error::{Error, Result};
use pushover::Message;

/// Receives every job in its terminal state
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, entity: &Entity) -> Result<()>;
}

/// Notifier driven by the live configuration.
///
/// Recipients are read from the newest config snapshot on every call.
pub struct NotificationHandler {
    config: watch::Receiver<Arc<Config>>,
    client: reqwest::Client,
}

impl NotificationHandler {
    pub fn new(config: watch::Receiver<Arc<Config>>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for NotificationHandler {
    async fn notify(&self, entity: &Entity) -> Result<()> {
        let config = self.config.borrow().clone();

        let Some(pushover) = &config.notifications.pushover else {
            info!(
                "notify: {} '{}' ({}), no notification channels configured",
                if entity.ok() { "recorded" } else { "failed" },
                entity.details.title,
                entity.details.channel
            );
            return Ok(());
        };

        let messages = pushover_messages(pushover, entity);
        let mut errors = Vec::new();
        for message in &messages {
            if let Err(e) = message.fire(&self.client, &pushover.endpoint).await {
                error!("notify: error during notification: {}", e);
                errors.push(e.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(Error::Notification(format!("errors encountered: {}", errors.join("; "))));
        }
        Ok(())
    }
}

/// Build one Pushover message per selected recipient
pub fn pushover_messages(cfg: &PushoverConfig, entity: &Entity) -> Vec<Message> {
    select_recipients(&cfg.recipients, &entity.details.title)
        .into_iter()
        .map(|recipient| Message::new(&cfg.app_token, &recipient.key, entity))
        .collect()
}

/// Pick who hears about a recording with this title.
///
/// Every recipient with at least one matching pattern is selected once. Only when
/// nobody matched does the default recipient get it. An empty title goes to nobody.
pub fn select_recipients<'a>(recipients: &'a [Recipient], title: &str) -> Vec<&'a Recipient> {
    if title.is_empty() {
        return Vec::new();
    }

    let title = title.to_lowercase();
    let mut selected = Vec::new();

    for recipient in recipients {
        for pattern in &recipient.notify {
            let matcher = match Regex::new(pattern) {
                Ok(m) => m,
                Err(e) => {
                    error!("notify: skipping regex '{}' for '{}': {}", pattern, recipient.name, e);
                    continue;
                }
            };

            if matcher.is_match(&title) {
                debug!("notify: adding notification for '{}' (regexp '{}', title '{}')", recipient.name, pattern, title);
                selected.push(recipient);
                break;
            }
        }
    }

    if selected.is_empty() {
        match recipients.iter().find(|r| r.default) {
            Some(default) => {
                debug!("notify: no match for title '{}', sending to default '{}'", title, default.name);
                selected.push(default);
            }
            None => warn!("notify: no match for title '{}' and no default recipient", title),
        }
    }

    selected
}
