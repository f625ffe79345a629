//! Inline SVG bar charts
//!
//! Charts are plain strings embedded in the dashboard page. Each bar carries a
//! `<title>` so hovering shows the exact count.

use crate::metrics::{Bucket, BucketCount};
use crate::utils::escape_html;
use std::fmt::Write;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// One labeled bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub label: String,
    pub value: usize,
}

/// Chart geometry and color
#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    pub color: &'static str,
    /// Upper bound on x-axis labels; the rest are thinned out
    pub max_labels: usize,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 720,
            height: 220,
            color: "#fe2c55",
            max_labels: 12,
        }
    }
}

const MARGIN_LEFT: f64 = 36.0;
const MARGIN_RIGHT: f64 = 8.0;
const MARGIN_TOP: f64 = 28.0;
const MARGIN_BOTTOM: f64 = 26.0;

/// Render a titled bar chart as an `<svg>` element
pub fn bar_chart(title: &str, bars: &[Bar], style: &ChartStyle) -> String {
    let w = style.width as f64;
    let h = style.height as f64;
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg class="chart" viewBox="0 0 {w} {h}" width="100%" role="img" aria-label="{t}" xmlns="http://www.w3.org/2000/svg">"#,
        t = escape_html(title)
    );
    let _ = write!(
        svg,
        r#"<text x="{MARGIN_LEFT}" y="18" class="chart-title">{}</text>"#,
        escape_html(title)
    );

    if bars.is_empty() {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" class="chart-empty">No data</text></svg>"#,
            w / 2.0,
            h / 2.0
        );
        return svg;
    }

    let plot_w = (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
    let plot_h = (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
    let max = bars.iter().map(|b| b.value).max().unwrap_or(0).max(1) as f64;
    let slot = plot_w / bars.len() as f64;
    let gap = (slot * 0.15).min(4.0);
    let label_every = bars.len().div_ceil(style.max_labels.max(1));
    let baseline = MARGIN_TOP + plot_h;

    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="end" class="chart-axis">{}</text>"#,
        MARGIN_LEFT - 4.0,
        MARGIN_TOP + 10.0,
        max as usize
    );
    let _ = write!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{baseline}" x2="{}" y2="{baseline}" class="chart-baseline"/>"#,
        w - MARGIN_RIGHT
    );

    for (i, bar) in bars.iter().enumerate() {
        let bh = bar.value as f64 / max * plot_h;
        let x = MARGIN_LEFT + i as f64 * slot + gap / 2.0;
        let label = escape_html(&bar.label);
        let _ = write!(
            svg,
            r#"<rect x="{x:.1}" y="{:.1}" width="{:.1}" height="{bh:.1}" rx="2" fill="{}"><title>{label}: {}</title></rect>"#,
            baseline - bh,
            (slot - gap).max(0.5),
            style.color,
            bar.value
        );
        if i % label_every == 0 {
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{}" text-anchor="middle" class="chart-axis">{label}</text>"#,
                x + (slot - gap) / 2.0,
                baseline + 16.0
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Bars for an activity series with bucket-appropriate labels
pub fn series_bars(series: &[BucketCount], bucket: Bucket) -> Vec<Bar> {
    series
        .iter()
        .map(|b| Bar {
            label: match bucket {
                Bucket::Day | Bucket::Week => b.start.format("%Y-%m-%d").to_string(),
                Bucket::Month => b.start.format("%Y-%m").to_string(),
            },
            value: b.count,
        })
        .collect()
}

pub fn hour_bars(bins: &[usize; 24]) -> Vec<Bar> {
    bins.iter()
        .enumerate()
        .map(|(h, v)| Bar {
            label: format!("{h:02}h"),
            value: *v,
        })
        .collect()
}

pub fn weekday_bars(bins: &[usize; 7]) -> Vec<Bar> {
    bins.iter()
        .zip(WEEKDAYS)
        .map(|(v, day)| Bar {
            label: day.to_string(),
            value: *v,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_chart_placeholder() {
        let svg = bar_chart("Nothing", &[], &ChartStyle::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("No data"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_one_rect_per_bar_and_escaped_labels() {
        let bars = vec![
            Bar {
                label: "<b>".to_string(),
                value: 3,
            },
            Bar {
                label: "ok".to_string(),
                value: 0,
            },
        ];
        let svg = bar_chart("A & B", &bars, &ChartStyle::default());
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("A &amp; B"));
        assert!(svg.contains("&lt;b&gt;: 3"));
        assert!(!svg.contains("<b>"));
    }

    #[test]
    fn test_labels_are_thinned() {
        let bars: Vec<Bar> = (0..48)
            .map(|i| Bar {
                label: format!("L{i}"),
                value: i,
            })
            .collect();
        let style = ChartStyle {
            max_labels: 6,
            ..ChartStyle::default()
        };
        let svg = bar_chart("Many", &bars, &style);
        assert_eq!(svg.matches("class=\"chart-axis\">L").count(), 6);
    }

    #[test]
    fn test_bar_helpers() {
        let series = vec![BucketCount {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            count: 4,
        }];
        assert_eq!(series_bars(&series, Bucket::Month)[0].label, "2024-02");
        assert_eq!(series_bars(&series, Bucket::Day)[0].label, "2024-02-01");

        let mut hours = [0usize; 24];
        hours[7] = 2;
        let hb = hour_bars(&hours);
        assert_eq!(hb.len(), 24);
        assert_eq!(hb[7].label, "07h");
        assert_eq!(hb[7].value, 2);

        let wb = weekday_bars(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(wb[6].label, "Sun");
        assert_eq!(wb[6].value, 7);
    }
}
