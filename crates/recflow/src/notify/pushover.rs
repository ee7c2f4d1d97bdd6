use std::time::Duration;
use humansize::{format_size, BINARY};
use log::{debug, info};
use serde::Deserialize;
use crate::entity::Entity;
use crate::error::{Error, Result};

/// Pushover message priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Silent = -1,
    Normal = 0,
    High = 1,
}

#[derive(Debug, Deserialize)]
struct Response {
    status: i32,
    #[allow(dead_code)]
    request: Option<String>,
}

/// A single Pushover notification for one user key
#[derive(Debug, Clone)]
pub struct Message {
    pub user: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub api_token: String,
}

impl Message {
    pub fn new(api_token: &str, user: &str, entity: &Entity) -> Self {
        let details = &entity.details;
        let subject = if entity.ok() {
            format!("New Recording: {} ({})", details.title, details.channel)
        } else {
            format!("Failed Recording: {} ({})", details.title, details.channel)
        };

        let mut body = String::new();
        body.push_str(details.description.trim());
        body.push_str("\n\n");

        let stats = &entity.stats;
        if entity.is_transcodable() {
            body.push_str(&format!(
                "Transcode completed in {} minutes, size change {}->{}. Path: {}",
                whole_minutes(stats.duration),
                format_size(stats.input_bytes, BINARY),
                format_size(stats.output_bytes, BINARY),
                entity.dest_path.display()
            ));
        } else {
            body.push_str(&format!(
                "Skipped transcoding. Size {}. Path: {}",
                format_size(stats.input_bytes, BINARY),
                entity.dest_path.display()
            ));
        }

        if let Some(err) = &entity.error {
            body.push_str(&format!("\nError: {}", err));
        }

        Self {
            user: user.to_string(),
            subject,
            body,
            priority: Priority::Normal,
            api_token: api_token.to_string(),
        }
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.api_token.clone()),
            ("user", self.user.clone()),
            ("priority", (self.priority as i32).to_string()),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
            ("message", self.body.clone()),
            ("title", self.subject.clone()),
        ]
    }

    /// Deliver the message. Failures are reported, never retried.
    pub async fn fire(&self, client: &reqwest::Client, endpoint: &str) -> Result<()> {
        let resp = client
            .post(endpoint)
            .form(&self.form())
            .send()
            .await
            .map_err(|e| Error::Notification(format!("pushover: error sending notification: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Notification(format!("pushover: unable to read response body: {}", e)))?;

        if status.is_server_error() {
            return Err(Error::Notification(format!(
                "pushover: status code {} indicates temporary failure, not retrying",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "pushover: bad status code {}, response body: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: Response = serde_json::from_str(&body)
            .map_err(|e| Error::Notification(format!("pushover: could not parse API response: {}", e)))?;
        if parsed.status != 1 {
            return Err(Error::Notification(format!(
                "pushover: API status was {}, expected 1, notification may not have been sent",
                parsed.status
            )));
        }

        info!("pushover: notification sent to {}", self.user);
        debug!("pushover: message body: {}", self.body);
        Ok(())
    }
}

fn whole_minutes(d: Duration) -> u64 {
    (d.as_secs() + 30) / 60
}
