//! Console rendering of level and spectrum snapshots.

use nerdisco_core::{AnalysisResult, SpectrumFrame};

const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One glyph per band, `▁` at or below 0 and `█` at or above 1.
pub fn render_spectrum(frame: &SpectrumFrame) -> String {
    frame
        .bands
        .iter()
        .map(|&v| {
            let clamped = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
            let idx = (clamped * (BAR_GLYPHS.len() - 1) as f32).round() as usize;
            BAR_GLYPHS[idx.min(BAR_GLYPHS.len() - 1)]
        })
        .collect()
}

/// Horizontal peak meter `[#####     ]` of `width` cells.
pub fn render_level(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
}

/// Peak level in dBFS, floored at -96.
pub fn level_dbfs(level: f32) -> f32 {
    if level <= 0.0 {
        return -96.0;
    }
    (20.0 * level.log10()).max(-96.0)
}

/// One status line for the latest snapshot, or `None` before the first buffer.
pub fn render_snapshot(result: &AnalysisResult) -> Option<String> {
    let levels = result.levels.as_ref()?;
    let meters = levels
        .as_slice()
        .iter()
        .map(|&l| format!("{} {:>6.1}dB", render_level(l, 16), level_dbfs(l)))
        .collect::<Vec<_>>()
        .join("  ");
    let spectrum = result
        .spectrum
        .as_ref()
        .map(render_spectrum)
        .unwrap_or_else(|| " ".repeat(nerdisco_core::BAND_COUNT));
    Some(format!("#{:<8} {}  |{}|", result.seq, meters, spectrum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nerdisco_core::{LevelVector, BAND_COUNT};

    #[test]
    fn spectrum_glyphs_cover_the_range() {
        let mut bands = [0.0; BAND_COUNT];
        bands[1] = 1.0;
        bands[2] = 2.5;
        bands[3] = -0.4;
        bands[4] = f32::NAN;
        let rendered: Vec<char> = render_spectrum(&SpectrumFrame { bands }).chars().collect();
        assert_eq!(rendered.len(), BAND_COUNT);
        assert_eq!(rendered[0], '▁');
        assert_eq!(rendered[1], '█');
        assert_eq!(rendered[2], '█');
        assert_eq!(rendered[3], '▁');
        assert_eq!(rendered[4], '▁');
    }

    #[test]
    fn level_bar_fills_proportionally() {
        assert_eq!(render_level(0.0, 4), "[    ]");
        assert_eq!(render_level(0.5, 4), "[##  ]");
        assert_eq!(render_level(3.0, 4), "[####]");
    }

    #[test]
    fn dbfs_is_floored() {
        assert_eq!(level_dbfs(0.0), -96.0);
        assert!((level_dbfs(0.5) + 6.02).abs() < 0.01);
        assert!(level_dbfs(1.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_line_needs_levels() {
        assert!(render_snapshot(&AnalysisResult::default()).is_none());
        let result = AnalysisResult {
            seq: 12,
            channels: 2,
            levels: Some(LevelVector(vec![0.5, 0.25])),
            ..AnalysisResult::default()
        };
        let line = render_snapshot(&result).expect("line");
        assert!(line.starts_with("#12"));
        assert_eq!(line.matches('[').count(), 2);
    }
}
