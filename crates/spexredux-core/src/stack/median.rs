use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{ReduxError, Result};
use crate::frame::Frame;
use crate::stats::median_in_place;

/// Combine frames by taking the median at each pixel position.
///
/// NaN pixels are ignored; a pixel that is NaN in every frame stays NaN.
/// The result carries the exposure time of the first frame.
/// Parallelizes at the row level for images >= 256x256.
pub fn median_stack(frames: &[Frame]) -> Result<Frame> {
    if frames.is_empty() {
        return Err(ReduxError::EmptySequence);
    }

    let (h, w) = frames[0].dim();
    for frame in &frames[1..] {
        if frame.dim() != (h, w) {
            return Err(ReduxError::DimensionMismatch {
                path: frame.metadata.source.clone().unwrap_or_default(),
                expected: (h, w),
                found: frame.dim(),
            });
        }
    }
    let n = frames.len();

    let combine_row = |row: usize, mut out: ArrayViewMut1<f64>| {
        let mut pixel_values = Vec::with_capacity(n);
        for (col, result) in out.iter_mut().enumerate() {
            pixel_values.clear();
            pixel_values.extend(
                frames
                    .iter()
                    .map(|f| f.data[[row, col]])
                    .filter(|v| !v.is_nan()),
            );
            *result = median_in_place(&mut pixel_values);
        }
    };

    let mut result = Array2::<f64>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out)| combine_row(row, out));
    } else {
        for (row, out) in result.axis_iter_mut(Axis(0)).enumerate() {
            combine_row(row, out);
        }
    }

    let mut combined = Frame::new(result);
    combined.metadata.exptime = frames[0].exptime();
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_three() {
        let frames: Vec<Frame> = [1.0, 9.0, 4.0]
            .iter()
            .map(|&v| Frame::new(Array2::from_elem((2, 3), v)))
            .collect();
        let result = median_stack(&frames).unwrap();
        assert!(result.data.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_nan_ignored() {
        let mut a = Array2::from_elem((1, 1), 2.0);
        a[[0, 0]] = f64::NAN;
        let frames = vec![
            Frame::new(a),
            Frame::new(Array2::from_elem((1, 1), 6.0)),
            Frame::new(Array2::from_elem((1, 1), 8.0)),
        ];
        let result = median_stack(&frames).unwrap();
        assert_eq!(result.data[[0, 0]], 7.0);
    }

    #[test]
    fn test_parallel_rows_match_per_pixel_median() {
        let (h, w) = (256, 260);
        let frames: Vec<Frame> = (0..3)
            .map(|k| {
                Frame::new(Array2::from_shape_fn((h, w), |(r, c)| {
                    (r * w + c) as f64 + [5.0, -3.0, 0.0][k]
                }))
            })
            .collect();
        assert!(h * w >= PARALLEL_PIXEL_THRESHOLD);

        let result = median_stack(&frames).unwrap();
        assert_eq!(result.dim(), (h, w));
        assert_eq!(result.data[[0, 0]], 0.0);
        assert_eq!(result.data[[h - 1, w - 1]], (h * w - 1) as f64);
        assert_eq!(result.data[[100, 17]], (100 * w + 17) as f64);
    }
}
