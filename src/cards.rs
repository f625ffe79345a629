//! Clip card grid for the most recent distinct clips

use crate::oembed::{ClipMeta, ClipMetaSource, lookup_all};
use crate::parse::{ClipEvent, ClipTable};
use crate::utils::escape_html;
use chrono_tz::Tz;
use std::fmt::Write;

pub const CARDS_PER_ROW_MIN: usize = 2;
pub const CARDS_PER_ROW_MAX: usize = 5;
pub const NUM_CARDS_MIN: usize = 4;
pub const NUM_CARDS_MAX: usize = 40;
pub const NUM_CARDS_STEP: usize = 4;

const ROW_HEIGHT_PX: usize = 300;
const MAX_GRID_HEIGHT_PX: usize = 1200;

pub fn clamp_cards_per_row(v: usize) -> usize {
    v.clamp(CARDS_PER_ROW_MIN, CARDS_PER_ROW_MAX)
}

/// Clamp to the slider range and snap down to its step
pub fn clamp_num_cards(v: usize) -> usize {
    let v = v.clamp(NUM_CARDS_MIN, NUM_CARDS_MAX);
    v - (v - NUM_CARDS_MIN) % NUM_CARDS_STEP
}

/// Hue for the generated cover: sum of code points of the clip id, mod 360
pub fn cover_seed(ev: &ClipEvent) -> u32 {
    let key = ev.video_id.as_deref().unwrap_or(ev.url.as_str());
    (key.chars().map(|c| c as u64).sum::<u64>() % 360) as u32
}

/// Visible grid height in pixels
pub fn grid_height(cards: usize, per_row: usize) -> usize {
    let rows = cards.div_ceil(per_row.max(1));
    (rows * ROW_HEIGHT_PX).min(MAX_GRID_HEIGHT_PX)
}

/// A card ready to render
#[derive(Debug, Clone)]
pub struct Card<'a> {
    pub event: &'a ClipEvent,
    pub meta: ClipMeta,
}

fn cover_html(card: &Card<'_>) -> String {
    match &card.meta.thumb {
        Some(thumb) => format!(
            r#"<img src="{}" alt="" loading="lazy" />"#,
            escape_html(thumb)
        ),
        None => {
            let seed = cover_seed(card.event);
            format!(
                r#"<div class="gradient" style="background:linear-gradient(135deg,hsla({seed},90%,60%,.85),hsla({},90%,55%,.7));"></div>"#,
                (seed + 60) % 360
            )
        }
    }
}

fn card_html(card: &Card<'_>, tz: Tz) -> String {
    let title = escape_html(card.meta.title.as_deref().unwrap_or("TikTok clip"));
    let local = card.event.ts_utc.with_timezone(&tz);
    let time = format!("{} {}", local.format("%Y-%m-%d %H:%M"), local.format("%Z"));
    let author = match card.meta.author.as_deref() {
        Some(a) => format!(" • {}", escape_html(a)),
        None => String::new(),
    };
    format!(
        r#"<div class="card"><div class="cover">{cover}</div><div class="meta"><div class="title">{title}</div><div class="sub">{time}{author}</div><a class="btn" href="{url}" target="_blank" rel="noopener">Open clip</a></div></div>"#,
        cover = cover_html(card),
        time = escape_html(&time),
        url = escape_html(&card.event.url),
    )
}

/// Render a grid of already resolved cards
pub fn render_grid(cards: &[Card<'_>], per_row: usize, tz: Tz) -> String {
    let per_row = clamp_cards_per_row(per_row);
    if cards.is_empty() {
        return r#"<div class="grid-empty">No clips in this selection.</div>"#.to_string();
    }
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div class="grid" style="grid-template-columns:repeat({per_row},1fr);max-height:{}px">"#,
        grid_height(cards.len(), per_row)
    );
    for card in cards {
        html.push_str(&card_html(card, tz));
    }
    html.push_str("</div>");
    html
}

/// Pick the `n` most recent distinct clips and resolve their metadata
pub async fn build_cards<'a>(
    table: &'a ClipTable,
    n: usize,
    meta: &dyn ClipMetaSource,
    concurrency: usize,
) -> Vec<Card<'a>> {
    let recent = table.recent_unique(n);
    let urls: Vec<String> = recent.iter().map(|r| r.url.clone()).collect();
    let metas = lookup_all(meta, &urls, concurrency).await;
    recent
        .into_iter()
        .zip(metas)
        .map(|(event, meta)| Card { event, meta })
        .collect()
}

/// Select, resolve and render the card grid for a table
pub async fn render_cards(
    table: &ClipTable,
    meta: &dyn ClipMetaSource,
    per_row: usize,
    n: usize,
    tz: Tz,
    concurrency: usize,
) -> String {
    let cards = build_cards(table, clamp_num_cards(n), meta, concurrency).await;
    render_grid(&cards, per_row, tz)
}
