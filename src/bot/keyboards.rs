use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::bonds::PlatformDescriptor;
use crate::models::{AssetMetadata, Post};

/// A url button, kept free of teloxide types until delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

impl LinkButton {
    pub fn new(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            url: url.to_string(),
        }
    }
}

/// Twitter / Telegram / Website row, whichever links the token has.
fn social_row(metadata: &AssetMetadata) -> Vec<LinkButton> {
    let mut row = Vec::new();
    if let Some(twitter) = &metadata.twitter {
        row.push(LinkButton::new("🐤 Twitter", twitter));
    }
    if let Some(telegram) = &metadata.telegram {
        row.push(LinkButton::new("📞 Telegram", telegram));
    }
    if let Some(website) = &metadata.website {
        row.push(LinkButton::new("🌐 Website", website));
    }
    row
}

pub fn bond_short_buttons(metadata: &AssetMetadata, dex_url: &str) -> Vec<Vec<LinkButton>> {
    let mut rows = Vec::new();
    let social = social_row(metadata);
    if !social.is_empty() {
        rows.push(social);
    }
    rows.push(vec![LinkButton::new("🦅 DEX Screener", dex_url)]);
    rows
}

pub fn bond_full_buttons(
    metadata: &AssetMetadata,
    platform: &PlatformDescriptor,
    platform_url: &str,
    dex_url: &str,
) -> Vec<Vec<LinkButton>> {
    vec![
        social_row(metadata),
        vec![
            LinkButton::new(platform.label(), platform_url),
            LinkButton::new("🦅 DEX Screener", dex_url),
        ],
    ]
}

pub fn post_buttons(post: &Post) -> Vec<Vec<LinkButton>> {
    vec![vec![LinkButton::new("🔗 View Tweet", &post.url)]]
}

/// Converts rows to an inline keyboard. Buttons with unparseable urls and
/// rows left empty are dropped; `None` when nothing remains.
pub fn link_keyboard(rows: &[Vec<LinkButton>]) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|button| match Url::parse(&button.url) {
                    Ok(url) => Some(InlineKeyboardButton::url(button.text.clone(), url)),
                    Err(e) => {
                        warn!("Dropping button {} with bad url {}: {}", button.text, button.url, e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}
