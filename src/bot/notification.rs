use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, InputMediaVideo, ParseMode};
use tracing::{error, info, warn};

use crate::api::retry::RetryPolicy;
use crate::bot::keyboards::{link_keyboard, LinkButton};
use crate::config::Config;
use crate::error::SentinelError;
use crate::models::{MediaKind, MediaRef, Platform};

/// Telegram rejects larger media groups.
pub const MAX_MEDIA_GROUP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Bonds(Platform),
    Tweets,
    Viral,
}

/// A formatted (MarkdownV2) message plus optional media and link buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: Channel,
    pub text: String,
    pub buttons: Vec<Vec<LinkButton>>,
    pub media: Vec<MediaRef>,
}

/// Outbound sink shared by every task.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// One delivery attempt.
    async fn send(&self, notification: &Notification) -> Result<(), SentinelError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::notification()
    }

    /// Bounded retry, then drop. Returns whether the message went out.
    async fn deliver(&self, notification: &Notification) -> bool {
        let policy = self.retry_policy();
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.send(notification).await {
                Ok(()) => return true,
                Err(e) => warn!("Failed to send {:?} notification ({}/{}): {}", notification.channel, attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }
        error!("Dropping {:?} notification after {} attempts", notification.channel, attempts);
        false
    }
}

/// Chat + forum thread per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoutes {
    pub main_chat: i64,
    pub viral_chat: i64,
    pub pump_topic: Option<i32>,
    pub bonk_topic: Option<i32>,
    pub tweets_topic: Option<i32>,
    pub viral_topic: Option<i32>,
}

impl ChannelRoutes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            main_chat: config.main_group_id,
            viral_chat: config.viral_group_id,
            pump_topic: config.pump_topic_id,
            bonk_topic: config.bonk_topic_id,
            tweets_topic: config.tweets_topic_id,
            viral_topic: config.viral_topic_id,
        }
    }

    pub fn route(&self, channel: Channel) -> (ChatId, Option<i32>) {
        match channel {
            Channel::Bonds(Platform::Pump) => (ChatId(self.main_chat), self.pump_topic),
            Channel::Bonds(Platform::Bonk) => (ChatId(self.main_chat), self.bonk_topic),
            Channel::Tweets => (ChatId(self.main_chat), self.tweets_topic),
            Channel::Viral => (ChatId(self.viral_chat), self.viral_topic),
        }
    }
}

pub struct TelegramNotifier {
    bot: Bot,
    routes: ChannelRoutes,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, routes: ChannelRoutes) -> Self {
        Self { bot, routes }
    }
}

fn media_file(media: &MediaRef) -> Result<InputFile, SentinelError> {
    let url = Url::parse(&media.url)
        .map_err(|e| SentinelError::MalformedData(format!("bad media url {}: {}", media.url, e)))?;
    Ok(InputFile::url(url))
}

fn telegram_error(e: teloxide::RequestError) -> SentinelError {
    SentinelError::Notification(e.to_string())
}

/// Media group items; the caption rides on the first one.
fn media_group(media: &[MediaRef], caption: &str) -> Result<Vec<InputMedia>, SentinelError> {
    media
        .iter()
        .take(MAX_MEDIA_GROUP)
        .enumerate()
        .map(|(index, item)| {
            let file = media_file(item)?;
            let caption = (index == 0).then(|| caption.to_string());
            Ok(match item.kind {
                MediaKind::Photo => {
                    let mut photo = InputMediaPhoto::new(file).parse_mode(ParseMode::MarkdownV2);
                    if let Some(caption) = caption {
                        photo = photo.caption(caption);
                    }
                    InputMedia::Photo(photo)
                }
                MediaKind::Video | MediaKind::Gif => {
                    let mut video = InputMediaVideo::new(file).parse_mode(ParseMode::MarkdownV2);
                    if let Some(caption) = caption {
                        video = video.caption(caption);
                    }
                    InputMedia::Video(video)
                }
            })
        })
        .collect()
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), SentinelError> {
        let (chat_id, topic) = self.routes.route(notification.channel);
        let keyboard = link_keyboard(&notification.buttons);

        match notification.media.as_slice() {
            [] => {
                let mut request = self
                    .bot
                    .send_message(chat_id, notification.text.clone())
                    .parse_mode(ParseMode::MarkdownV2)
                    .disable_web_page_preview(true);
                if let Some(thread) = topic {
                    request = request.message_thread_id(thread);
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(keyboard);
                }
                request.await.map_err(telegram_error)?;
            }
            [single] if single.kind == MediaKind::Photo => {
                let mut request = self
                    .bot
                    .send_photo(chat_id, media_file(single)?)
                    .caption(notification.text.clone())
                    .parse_mode(ParseMode::MarkdownV2);
                if let Some(thread) = topic {
                    request = request.message_thread_id(thread);
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(keyboard);
                }
                request.await.map_err(telegram_error)?;
            }
            [single] => {
                let mut request = self
                    .bot
                    .send_video(chat_id, media_file(single)?)
                    .caption(notification.text.clone())
                    .parse_mode(ParseMode::MarkdownV2);
                if let Some(thread) = topic {
                    request = request.message_thread_id(thread);
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(keyboard);
                }
                request.await.map_err(telegram_error)?;
            }
            many => {
                // Media groups cannot carry a keyboard.
                let mut request = self
                    .bot
                    .send_media_group(chat_id, media_group(many, &notification.text)?);
                if let Some(thread) = topic {
                    request = request.message_thread_id(thread);
                }
                request.await.map_err(telegram_error)?;
            }
        }

        info!("Notification sent to {:?}", notification.channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyNotifier {
        failures: AtomicU32,
        sends: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, _: &Notification) -> Result<(), SentinelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SentinelError::Notification("429 Too Many Requests".into()));
            }
            Ok(())
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::new(3, Duration::ZERO)
        }
    }

    fn notification() -> Notification {
        Notification {
            channel: Channel::Tweets,
            text: "gm".to_string(),
            buttons: vec![],
            media: vec![],
        }
    }

    #[tokio::test]
    async fn test_deliver_retries_then_succeeds() {
        let notifier = FlakyNotifier { failures: AtomicU32::new(2), sends: AtomicU32::new(0) };
        assert!(notifier.deliver(&notification()).await);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deliver_gives_up() {
        let notifier = FlakyNotifier { failures: AtomicU32::new(5), sends: AtomicU32::new(0) };
        assert!(!notifier.deliver(&notification()).await);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_routes() {
        let routes = ChannelRoutes {
            main_chat: -100,
            viral_chat: -200,
            pump_topic: Some(3),
            bonk_topic: Some(4),
            tweets_topic: None,
            viral_topic: Some(9),
        };
        assert_eq!(routes.route(Channel::Bonds(Platform::Bonk)), (ChatId(-100), Some(4)));
        assert_eq!(routes.route(Channel::Tweets), (ChatId(-100), None));
        assert_eq!(routes.route(Channel::Viral), (ChatId(-200), Some(9)));
    }

    #[test]
    fn test_media_group_caps_and_captions_first() {
        let media: Vec<MediaRef> = (0..12)
            .map(|i| MediaRef { kind: MediaKind::Photo, url: format!("https://pbs/img{}.jpg", i) })
            .collect();
        let group = media_group(&media, "caption").unwrap();
        assert_eq!(group.len(), MAX_MEDIA_GROUP);
        match (&group[0], &group[1]) {
            (InputMedia::Photo(first), InputMedia::Photo(second)) => {
                assert_eq!(first.caption.as_deref(), Some("caption"));
                assert!(second.caption.is_none());
            }
            _ => panic!("expected photos"),
        }
    }
}
