//! Waveform envelopes for visualizing recorded samples.
//!
//! Produces the per-column data a renderer draws; drawing itself is left to
//! the integration shell.

use serde::Serialize;

/// Smallest and largest sample within one display column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinMax {
    pub min: f32,
    pub max: f32,
}

/// Split `samples` into `columns` contiguous slices and report each slice's extremes.
///
/// When there are fewer samples than columns, the surplus columns are empty
/// and omitted.
pub fn min_max_columns(samples: &[f32], columns: usize) -> Vec<MinMax> {
    if samples.is_empty() || columns == 0 {
        return Vec::new();
    }

    let columns = columns.min(samples.len());
    let mut envelope = Vec::with_capacity(columns);
    for column in 0..columns {
        let start = column * samples.len() / columns;
        let end = (column + 1) * samples.len() / columns;
        let slice = &samples[start..end];
        let (min, max) = slice
            .iter()
            .fold((f32::MAX, f32::MIN), |(min, max), &s| (min.min(s), max.max(s)));
        envelope.push(MinMax { min, max });
    }
    envelope
}

/// Pick one sample per column from `samples[offset..offset + length]`.
///
/// Stops early when the window runs past the end of `samples`.
pub fn sample_columns(samples: &[f32], offset: usize, length: usize, columns: usize) -> Vec<f32> {
    let mut picked = Vec::with_capacity(columns);
    if columns == 0 {
        return picked;
    }
    for column in 0..columns {
        let index = offset + length * column / columns;
        match samples.get(index) {
            Some(&value) => picked.push(value),
            None => break,
        }
    }
    picked
}

/// Map a sample in `[-1, 1]` to a row of a display `height` pixels tall.
pub fn sample_to_row(value: f32, height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    let row = (height as f32 * (value.clamp(-1.0, 1.0) + 1.0) / 2.0) as usize;
    row.min(height - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_per_column() {
        let samples = [0.1, -0.5, 0.9, 0.2, -0.1, 0.0];
        let envelope = min_max_columns(&samples, 3);
        assert_eq!(
            envelope,
            vec![
                MinMax { min: -0.5, max: 0.1 },
                MinMax { min: 0.2, max: 0.9 },
                MinMax { min: -0.1, max: 0.0 },
            ]
        );
    }

    #[test]
    fn fewer_samples_than_columns() {
        let envelope = min_max_columns(&[0.5, -0.5], 10);
        assert_eq!(envelope.len(), 2);
        assert_eq!(envelope[1], MinMax { min: -0.5, max: -0.5 });
    }

    #[test]
    fn empty_input_has_no_columns() {
        assert!(min_max_columns(&[], 4).is_empty());
        assert!(min_max_columns(&[1.0], 0).is_empty());
    }

    #[test]
    fn sample_columns_stride_through_window() {
        let samples: Vec<f32> = (0..10).map(|v| v as f32).collect();
        assert_eq!(sample_columns(&samples, 2, 8, 4), vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!(sample_columns(&samples, 8, 8, 4), vec![8.0]);
    }

    #[test]
    fn rows_are_clamped_into_the_display() {
        assert_eq!(sample_to_row(-1.0, 100), 0);
        assert_eq!(sample_to_row(0.0, 100), 50);
        assert_eq!(sample_to_row(1.0, 100), 99);
        assert_eq!(sample_to_row(3.0, 100), 99);
        assert_eq!(sample_to_row(0.0, 0), 0);
    }
}
