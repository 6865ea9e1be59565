//! Sync outcome notifications.

use pipeline::Timestamp;

/// Subject and body of one outcome message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Message subject, prefixed with the site name.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Notification {
    /// Message for a completed scheduled sync.
    pub fn success(site_name: &str, completed_at: Timestamp, next_sync: Option<Timestamp>) -> Self {
        let next = next_sync
            .map(Timestamp::to_display_string)
            .unwrap_or_else(|| "not scheduled".to_string());
        Self {
            subject: format!("[{site_name}] Task digest sync completed successfully"),
            body: format!(
                "The scheduled task digest sync completed successfully.\n\n\
                 Sync completed at: {}\n\
                 Next sync: {next}\n",
                completed_at.to_display_string()
            ),
        }
    }

    /// Message for a scheduled sync that failed with `error`.
    pub fn failure(site_name: &str, error: &str) -> Self {
        Self {
            subject: format!("[{site_name}] Task digest sync failed"),
            body: format!(
                "The scheduled task digest sync failed.\n\n\
                 Error: {error}\n\n\
                 Please check your API keys and settings.\n"
            ),
        }
    }
}
