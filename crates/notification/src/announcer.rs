//! Announcement phrasing and queueing

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dispatch::{Outcome, OutcomeKind};
use plate_tracker::Panel;

use crate::Notifier;

/// Announcement language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub language: Language,
    /// Announcements buffered before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: Language::Vi,
            queue_capacity: 16,
        }
    }
}

/// One phrase ready for the speech consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub plate: String,
    pub panel: Panel,
    pub kind: OutcomeKind,
    pub text: String,
}

impl Announcement {
    pub fn compose(plate: &str, panel: Panel, outcome: &Outcome, language: Language) -> Self {
        let text = match (language, outcome.success, outcome.is_cached) {
            (Language::Vi, true, true) => format!(
                "Biển số xe {} đã được phát hiện trước đó tại cổng {}",
                plate, panel
            ),
            (Language::Vi, true, false) => format!(
                "Phát hiện biển số xe {} tại cổng {}. {}",
                plate, panel, outcome.message
            ),
            (Language::Vi, false, _) => format!(
                "Lỗi khi xử lý biển số xe {} tại cổng {}. {}",
                plate, panel, outcome.message
            ),
            (Language::En, true, true) => format!(
                "License plate {} was already detected at gate {}",
                plate, panel
            ),
            (Language::En, true, false) => format!(
                "Detected license plate {} at gate {}. {}",
                plate, panel, outcome.message
            ),
            (Language::En, false, _) => format!(
                "Error while processing license plate {} at gate {}. {}",
                plate, panel, outcome.message
            ),
        };

        Self {
            plate: plate.to_string(),
            panel,
            kind: outcome.kind(),
            text,
        }
    }
}

/// Queues announcements on a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    config: NotifierConfig,
    tx: mpsc::Sender<Announcement>,
}

impl ChannelNotifier {
    /// Create the notifier and the receiving end for the consumer
    pub fn new(config: NotifierConfig) -> (Self, mpsc::Receiver<Announcement>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        info!(
            "Announcements {} (language {:?}, queue {})",
            if config.enabled { "enabled" } else { "disabled" },
            config.language,
            config.queue_capacity
        );
        (Self { config, tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, plate: &str, panel: Panel, outcome: &Outcome) {
        if !self.config.enabled {
            return;
        }

        let announcement = Announcement::compose(plate, panel, outcome, self.config.language);
        match self.tx.try_send(announcement) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Announcement queue full, dropping: {}", dropped.text);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Announcement consumer gone");
            }
        }
    }
}

/// Default consumer: writes every announcement to the log
pub async fn run_announcer(mut rx: mpsc::Receiver<Announcement>) {
    while let Some(announcement) = rx.recv().await {
        info!(
            target: "announcer",
            "[{}] {}",
            announcement.kind.as_str(),
            announcement.text
        );
    }
    debug!("Announcer stopped");
}
