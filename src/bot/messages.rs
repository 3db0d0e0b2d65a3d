use chrono::{DateTime, Utc};
use teloxide::utils::markdown::escape;

use crate::bonds::PlatformDescriptor;
use crate::bot::keyboards::{bond_full_buttons, bond_short_buttons, post_buttons};
use crate::bot::notification::{Channel, Notification};
use crate::models::{MediaKind, MediaRef, Post, TokenAsset};

/// Compact dollar amount: 950 -> "950.00", 15234.5 -> "15.23K".
pub fn format_currency(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.2}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.2}K", value / 1_000.0)
    } else {
        format!("{:.2}", value)
    }
}

/// `abcd...wxyz`
pub fn compress_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 8 {
        return wallet.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn token_line(asset: &TokenAsset) -> String {
    let token_info = escape(&format!("{} (${})", asset.metadata.name, asset.metadata.symbol));
    format!("📛 *{}*\n📄 *CA:* `{}`", token_info, asset.mint())
}

pub fn bond_short_text(asset: &TokenAsset) -> String {
    token_line(asset)
}

pub fn bond_full_text(asset: &TokenAsset, platform: &PlatformDescriptor) -> String {
    let creator = &asset.metadata.creator;
    let dev_link = format!("[{}]({})", escape(&compress_wallet(creator)), platform.dev_url(creator));
    let dev_hodls = if asset.holders.dev_allocation > 1 {
        asset.holders.dev_allocation.to_string()
    } else {
        "<1".to_string()
    };
    let top_five = asset
        .holders
        .top_holders
        .iter()
        .take(5)
        .map(|h| format!("{}%", h.allocation))
        .collect::<Vec<_>>()
        .join(" | ");

    let mut text = format!(
        "*{}*\n\n{}\n\n👨‍💻 *Dev:* {}\n🏛 *Dev Hodls:* {}%\n\n🐳 *Top Hodlers:* {}\n*🏦 Top 20 Hodlers allocation:* {}%\n",
        escape("- NEW BOND -"),
        token_line(asset),
        dev_link,
        dev_hodls,
        escape(&top_five),
        asset.holders.top_holders_allocation,
    );

    if let Some(stats) = &asset.stats {
        if let Some(day) = &stats.stats_24h {
            text.push_str(&format!(
                "\n*👥 Total Hodlers:* {}\n*🌱 Organic Score:* {}\n*📈 Stats:*\n        • Buy Volume: {}$\n        • Sell Volume: {}$\n        • Buys: {}\n        • Sells: {}\n        • Traders: {}\n",
                stats.holder_count,
                escape(&capitalize(&stats.organic_score_label)),
                escape(&format_currency(day.buy_volume)),
                escape(&format_currency(day.sell_volume)),
                day.num_buys,
                day.num_sells,
                day.num_traders,
            ));
        }
    }

    text.push_str(&format!("\n*⏰ Fill time: *{}", escape(&asset.fill_time)));
    text
}

/// Photo message for a freshly migrated token.
pub fn bond_notification(asset: &TokenAsset, platform: &PlatformDescriptor, full_stats: bool) -> Notification {
    let (text, buttons) = if full_stats {
        (
            bond_full_text(asset, platform),
            bond_full_buttons(&asset.metadata, platform, &asset.platform_url, &asset.dex_url),
        )
    } else {
        (bond_short_text(asset), bond_short_buttons(&asset.metadata, &asset.dex_url))
    };
    let media = if asset.metadata.image_url.is_empty() {
        Vec::new()
    } else {
        vec![MediaRef {
            kind: MediaKind::Photo,
            url: asset.metadata.image_url.clone(),
        }]
    };

    Notification {
        channel: Channel::Bonds(platform.platform),
        text,
        buttons,
        media,
    }
}

pub fn post_text(post: &Post, title: &str, now: DateTime<Utc>) -> String {
    let username = escape(&post.author.username);
    let minutes_ago = now.signed_duration_since(post.created_at).num_minutes().max(0);
    let posted = format!(
        "{} ({}m ago)",
        post.created_at.format("%b %d, %y @ %I:%M %p"),
        minutes_ago
    );

    format!(
        "*{}*\n\n🦸‍ [{}](https://x.com/{}) ✦ {}\n🗓️ {}\n💬`{}` 🔁`{}` ❤️`{}` 👁️`{}`\n\n{}\n\n",
        escape(title),
        username,
        post.author.username,
        escape(&format!("({})", post.author.followers)),
        escape(&posted),
        post.metrics.replies,
        post.metrics.retweets,
        post.metrics.likes,
        post.metrics.views,
        escape(&post.text),
    )
}

pub fn new_post_notification(post: &Post, now: DateTime<Utc>) -> Notification {
    Notification {
        channel: Channel::Tweets,
        text: post_text(post, "- NEW TWEET -", now),
        buttons: post_buttons(post),
        media: post.media.clone(),
    }
}

pub fn viral_post_notification(post: &Post, now: DateTime<Utc>) -> Notification {
    Notification {
        channel: Channel::Viral,
        text: post_text(post, "- VIRAL TWEET -", now),
        buttons: post_buttons(post),
        media: post.media.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AssetMetadataSource;
    use crate::error::SentinelError;
    use crate::models::{AssetMetadata, Holder, HoldersInfo, PostAuthor, PostMetrics, TokenStats, TradeStats24h};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Arc;

    struct NoMetadata;

    #[async_trait]
    impl AssetMetadataSource for NoMetadata {
        async fn fetch_asset(&self, _: &str) -> Result<Option<AssetMetadata>, SentinelError> {
            Ok(None)
        }
    }

    fn asset() -> TokenAsset {
        TokenAsset {
            metadata: AssetMetadata {
                mint: "MintAbc".to_string(),
                name: "Dog.Wif".to_string(),
                symbol: "DWIF".to_string(),
                creator: "CreatorWalletAddress1234".to_string(),
                image_url: "https://img/dwif.png".to_string(),
                twitter: None,
                telegram: None,
                website: None,
                created_at: Utc::now(),
            },
            holders: HoldersInfo {
                top_holders: vec![
                    Holder { address: "A".into(), allocation: 4 },
                    Holder { address: "B".into(), allocation: 3 },
                ],
                dev_allocation: 1,
                top_holders_allocation: 7,
            },
            stats: Some(TokenStats {
                holder_count: 812,
                organic_score_label: "medium".to_string(),
                stats_24h: Some(TradeStats24h {
                    buy_volume: 15234.5,
                    sell_volume: 900.0,
                    num_buys: 410,
                    num_sells: 233,
                    num_traders: 301,
                }),
            }),
            fill_time: "1 hour".to_string(),
            platform_url: "https://pump.fun/MintAbc".to_string(),
            dex_url: "https://dexscreener.com/solana/MintAbc".to_string(),
        }
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(950.0), "950.00");
        assert_eq!(format_currency(15234.5), "15.23K");
        assert_eq!(format_currency(2_500_000.0), "2.50M");
    }

    #[test]
    fn test_compress_wallet() {
        assert_eq!(compress_wallet("CreatorWalletAddress1234"), "Crea...1234");
        assert_eq!(compress_wallet("short"), "short");
    }

    #[test]
    fn test_full_text_contents() {
        let platform = PlatformDescriptor::pump(Arc::new(NoMetadata));
        let text = bond_full_text(&asset(), &platform);
        assert!(text.contains("Dog\\.Wif \\($DWIF\\)"));
        assert!(text.contains("https://pump.fun/profile/CreatorWalletAddress1234"));
        assert!(text.contains("*Dev Hodls:* <1%"));
        assert!(text.contains("4% \\| 3%"));
        assert!(text.contains("*🌱 Organic Score:* Medium"));
        assert!(text.contains("Buy Volume: 15\\.23K$"));
        assert!(text.ends_with("1 hour"));
    }

    #[test]
    fn test_bond_notification_styles() {
        let platform = PlatformDescriptor::bonk(Arc::new(NoMetadata), vec![]);
        let short = bond_notification(&asset(), &platform, false);
        assert_eq!(short.channel, Channel::Bonds(crate::models::Platform::Bonk));
        assert!(!short.text.contains("NEW BOND"));
        assert_eq!(short.media.len(), 1);
        assert_eq!(short.buttons.len(), 1);

        let full = bond_notification(&asset(), &platform, true);
        assert!(full.text.contains("NEW BOND"));
        assert_eq!(full.buttons[1][0].text, "🔨 Bonk");
    }

    #[test]
    fn test_post_text() {
        let now = Utc::now();
        let post = Post {
            post_id: "1".into(),
            url: "https://x.com/alice/status/1".into(),
            author: PostAuthor { username: "alice_x".into(), followers: 1200 },
            metrics: PostMetrics { views: 6400, likes: 80, replies: 20, retweets: 12 },
            text: "gm.".into(),
            media: vec![],
            created_at: now - Duration::minutes(42),
            review: None,
        };
        let text = new_post_notification(&post, now).text;
        assert!(text.starts_with("*\\- NEW TWEET \\-*"));
        assert!(text.contains("[alice\\_x](https://x.com/alice_x)"));
        assert!(text.contains("\\(42m ago\\)"));
        assert!(text.contains("👁️`6400`"));
        assert!(text.contains("gm\\."));
        assert_eq!(viral_post_notification(&post, now).channel, Channel::Viral);
    }
}
