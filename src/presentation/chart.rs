use crate::types::StatBucket;

const BAR: char = '█';

/// Chart-ready point: bucket label (`HH:MM`) and its count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub label: String,
    pub count: u64,
}

pub fn chart_points(stats: &[StatBucket]) -> Vec<ChartPoint> {
    stats
        .iter()
        .map(|bucket| ChartPoint {
            label: bucket.timestamp.format("%H:%M").to_string(),
            count: bucket.count,
        })
        .collect()
}

/// Horizontal bar chart of the most recent `max_rows` buckets, bars scaled so
/// the busiest bucket spans `bar_width` columns.
pub fn render_volume_chart(stats: &[StatBucket], max_rows: usize, bar_width: usize) -> Vec<String> {
    if stats.is_empty() || max_rows == 0 {
        return vec!["(no volume data)".to_string()];
    }
    let recent = &stats[stats.len().saturating_sub(max_rows)..];
    let peak = recent.iter().map(|b| b.count).max().unwrap_or(0).max(1);

    chart_points(recent)
        .into_iter()
        .map(|point| {
            let scaled = (point.count as u128 * bar_width as u128).div_ceil(peak as u128) as usize;
            let bar: String = std::iter::repeat(BAR).take(scaled).collect();
            format!("{} │{} {}", point.label, bar, point.count)
        })
        .collect()
}
