//! Command dispatcher. Each group message is evaluated against the rules in strict order and the
//! first match is terminal:
//!
//! 1. exact toggle command: flip the feature for the group and announce the new state;
//! 2. ad keyword: withdraw, notify, optionally kick;
//! 3. video marker with video check on: probe duration, withdraw short clips
//!    (optionally only when frames contain a QR code);
//! 4. image markers with image check on: scan in order, withdraw on the first positive;
//! 5. nothing.
//!
//! Any error ends handling of that one event: it is logged and recorded, and no action is taken.
//! Log format: [withdraw][onebot][self_id] key=value ...

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::delivery::BotActions;
use crate::error::{Result, StateError};
use crate::event_log::EventSink;
use crate::onebot::cq::{first_video, images};
use crate::onebot::log::{prefix, truncate_content_default};
use crate::onebot::{extract_media, Event, MessageEvent};
use crate::state::{Feature, ModerationState, ToggleNotice};

/// Video duration lookup without a full download.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_secs(&self, url: &str) -> Result<f64>;
}

/// Media retrieval and QR inspection.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Save the clip locally; returns its path.
    async fn download_video(&self, url: &str) -> Result<PathBuf>;
    /// Whether enough sampled frames of a saved clip contain a QR code.
    async fn video_has_qr(&self, video: &Path) -> Result<bool>;
    /// Whether the image at `url` contains a QR code.
    async fn image_has_qr(&self, url: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    Clean,
    Toggled { feature: Feature, notice: ToggleNotice },
    KeywordViolation { keyword: String },
    DurationViolation { duration: f64 },
    QrViolation { url: String },
}

impl ModerationOutcome {
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            ModerationOutcome::KeywordViolation { .. }
                | ModerationOutcome::DurationViolation { .. }
                | ModerationOutcome::QrViolation { .. }
        )
    }
}

/// The message a moderation action applies to. Also the query shape of the probe endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageTarget {
    pub self_id: String,
    pub message_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub group_id: String,
}

impl From<&MessageEvent> for MessageTarget {
    fn from(event: &MessageEvent) -> Self {
        Self {
            self_id: event.self_id.clone(),
            message_id: event.message_id.clone(),
            user_id: event.user_id.clone(),
            group_id: event.group_id.clone(),
        }
    }
}

/// Result of the duration check for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoReport {
    pub duration: f64,
    pub outcome: ModerationOutcome,
}

pub struct Dispatcher {
    config: Arc<Config>,
    state: Arc<ModerationState>,
    actions: Arc<dyn BotActions>,
    probe: Arc<dyn DurationProbe>,
    inspector: Arc<dyn MediaInspector>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        state: Arc<ModerationState>,
        actions: Arc<dyn BotActions>,
        probe: Arc<dyn DurationProbe>,
        inspector: Arc<dyn MediaInspector>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            state,
            actions,
            probe,
            inspector,
            events,
        }
    }

    pub async fn handle_event(&self, event: &Event) -> ModerationOutcome {
        match event {
            Event::Message(message) => self.handle_message(message).await,
            Event::MetaEvent(meta) => {
                if meta.meta_event_type == "heartbeat" {
                    tracing::trace!("{} heartbeat interval={}", prefix(&meta.self_id), meta.interval);
                } else {
                    tracing::info!("{} meta_event={} sub_type={}", prefix(&meta.self_id), meta.meta_event_type, meta.sub_type);
                }
                ModerationOutcome::Clean
            }
            Event::Notice(notice) => {
                tracing::debug!("{} notice={} group_id={}", prefix(&notice.self_id), notice.notice_type, notice.group_id);
                ModerationOutcome::Clean
            }
            Event::Other(post_type) => {
                tracing::debug!(post_type, "ignored event");
                ModerationOutcome::Clean
            }
        }
    }

    /// Evaluate one message. Never fails: errors are recorded and the message is left alone.
    pub async fn handle_message(&self, message: &MessageEvent) -> ModerationOutcome {
        if !message.is_group() {
            return ModerationOutcome::Clean;
        }
        tracing::debug!(
            "{} group_id={} user_id={} message_id={} content={}",
            prefix(&message.self_id),
            message.group_id,
            message.user_id,
            message.message_id,
            truncate_content_default(&message.raw_message)
        );
        match self.evaluate(message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let line = format!(
                    "{} group_id={} message_id={} handling abandoned: {}",
                    prefix(&message.self_id),
                    message.group_id,
                    message.message_id,
                    e
                );
                tracing::warn!("{}", line);
                self.events.record(&line).await;
                ModerationOutcome::Clean
            }
        }
    }

    async fn evaluate(&self, message: &MessageEvent) -> Result<ModerationOutcome> {
        let target = MessageTarget::from(message);
        let text = message.raw_message.as_str();

        if let Some(feature) = self.config.toggle_feature(text) {
            let notice = self.toggle_feature(&target.group_id, feature).await?;
            let reply = self.config.toggle_notice(feature, notice);
            self.actions
                .notify_group(&target.self_id, &target.group_id, &target.user_id, reply)
                .await?;
            self.events.record(&format!(
                "{} group_id={} feature={} toggled={:?}",
                prefix(&target.self_id),
                target.group_id,
                feature.key(),
                notice
            )).await;
            return Ok(ModerationOutcome::Toggled { feature, notice });
        }

        if let Some(keyword) = self.config.matching_keyword(text) {
            return self.withdraw_keyword(&target, keyword).await;
        }

        let media = extract_media(text);
        if let Some(video) = first_video(&media) {
            if self.feature_enabled(&target.group_id, Feature::VideoCheck).await {
                return Ok(self.check_video(&target, &video.url).await?.outcome);
            }
        }

        if images(&media).next().is_some() && self.feature_enabled(&target.group_id, Feature::ImageCheck).await {
            for image in images(&media) {
                let outcome = self.check_image(&target, &image.url).await?;
                if outcome.is_violation() {
                    return Ok(outcome);
                }
            }
        }

        Ok(ModerationOutcome::Clean)
    }

    // SQLite calls go to the blocking pool.
    async fn toggle_feature(&self, group_id: &str, feature: Feature) -> Result<ToggleNotice> {
        let state = Arc::clone(&self.state);
        let group_id = group_id.to_string();
        let notice = tokio::task::spawn_blocking(move || state.toggle(&group_id, feature))
            .await
            .map_err(|e| StateError::Task(e.to_string()))??;
        Ok(notice)
    }

    async fn feature_enabled(&self, group_id: &str, feature: Feature) -> bool {
        let state = Arc::clone(&self.state);
        let group_id = group_id.to_string();
        tokio::task::spawn_blocking(move || state.is_enabled(&group_id, feature))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(feature = feature.key(), error = %e, "state lookup task failed, treating as disabled");
                false
            })
    }

    async fn withdraw_keyword(&self, target: &MessageTarget, keyword: &str) -> Result<ModerationOutcome> {
        self.actions.delete_message(&target.self_id, &target.message_id).await?;
        self.events.record(&format!(
            "{} group_id={} user_id={} message_id={} keyword={} withdrawn",
            prefix(&target.self_id),
            target.group_id,
            target.user_id,
            target.message_id,
            keyword
        )).await;
        self.actions
            .notify_group(&target.self_id, &target.group_id, &target.user_id, &self.config.withdraw_notice)
            .await?;
        if self.config.set_group_kick {
            self.actions
                .kick_member(&target.self_id, &target.group_id, &target.user_id)
                .await?;
            self.events.record(&format!(
                "{} group_id={} user_id={} kicked",
                prefix(&target.self_id),
                target.group_id,
                target.user_id
            )).await;
        }
        Ok(ModerationOutcome::KeywordViolation {
            keyword: keyword.to_string(),
        })
    }

    /// Probe `url` and withdraw the message when the clip is shorter than the configured limit.
    /// Short clips are always saved; with QR checking on, a QR positive is also required.
    pub async fn check_video(&self, target: &MessageTarget, url: &str) -> Result<VideoReport> {
        let duration = self.probe.duration_secs(url).await?;
        let limit = f64::from(self.config.video_second_limit);
        tracing::info!("{} message_id={} video_duration={:.3} limit={}", prefix(&target.self_id), target.message_id, duration, limit);
        if duration >= limit {
            return Ok(VideoReport {
                duration,
                outcome: ModerationOutcome::Clean,
            });
        }
        self.events.record(&format!(
            "{} message_id={} video duration {:.3}s below limit {}s url={}",
            prefix(&target.self_id),
            target.message_id,
            duration,
            limit,
            url
        )).await;

        let saved = self.inspector.download_video(url).await;
        if self.config.check_video_qrcode {
            let path = saved?;
            if !self.inspector.video_has_qr(&path).await? {
                self.events.record(&format!("{} message_id={} video has no qr, passed url={}", prefix(&target.self_id), target.message_id, url)).await;
                return Ok(VideoReport {
                    duration,
                    outcome: ModerationOutcome::Clean,
                });
            }
            self.events.record(&format!("{} message_id={} video contains qr url={}", prefix(&target.self_id), target.message_id, url)).await;
        } else if let Err(e) = saved {
            tracing::warn!("{} message_id={} video not saved: {}", prefix(&target.self_id), target.message_id, e);
        }

        self.withdraw(target).await?;
        Ok(VideoReport {
            duration,
            outcome: ModerationOutcome::DurationViolation { duration },
        })
    }

    /// Scan the image at `url` and withdraw the message on a positive.
    pub async fn check_image(&self, target: &MessageTarget, url: &str) -> Result<ModerationOutcome> {
        if !self.inspector.image_has_qr(url).await? {
            tracing::debug!("{} message_id={} image clean url={}", prefix(&target.self_id), target.message_id, url);
            return Ok(ModerationOutcome::Clean);
        }
        self.events.record(&format!("{} message_id={} image contains qr url={}", prefix(&target.self_id), target.message_id, url)).await;
        self.withdraw(target).await?;
        Ok(ModerationOutcome::QrViolation { url: url.to_string() })
    }

    async fn withdraw(&self, target: &MessageTarget) -> Result<()> {
        self.actions.delete_message(&target.self_id, &target.message_id).await?;
        self.actions
            .notify_group(&target.self_id, &target.group_id, &target.user_id, &self.config.withdraw_notice)
            .await?;
        self.events.record(&format!(
            "{} group_id={} user_id={} message_id={} withdrawn",
            prefix(&target.self_id),
            target.group_id,
            target.user_id,
            target.message_id
        )).await;
        Ok(())
    }
}
