use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::stats::median_in_place;

/// Square median filter of odd `size` with half-sample symmetric
/// ("reflect") boundaries. NaN pixels are skipped inside each window.
pub fn median_filter(data: &Array2<f64>, size: usize) -> Array2<f64> {
    let (h, w) = data.dim();
    if h == 0 || w == 0 || size <= 1 {
        return data.clone();
    }
    let radius = (size / 2) as isize;

    let filter_row = |row: usize| -> Vec<f64> {
        let mut window = Vec::with_capacity(size * size);
        (0..w)
            .map(|col| {
                window.clear();
                for dr in -radius..=radius {
                    let r = reflect(row as isize + dr, h);
                    for dc in -radius..=radius {
                        let c = reflect(col as isize + dc, w);
                        let v = data[[r, c]];
                        if !v.is_nan() {
                            window.push(v);
                        }
                    }
                }
                median_in_place(&mut window)
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(filter_row).collect()
    } else {
        (0..h).map(filter_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}

fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let mut i = i;
    if i < 0 {
        i = -i - 1;
    }
    if i >= n {
        i = 2 * n - i - 1;
    }
    i.clamp(0, n - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_hot_pixel() {
        let mut data = Array2::from_elem((7, 7), 10.0);
        data[[3, 3]] = 1.0e6;
        let filtered = median_filter(&data, 5);
        assert_eq!(filtered[[3, 3]], 10.0);
    }

    #[test]
    fn test_reflect_indices() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(-2, 1), 0);
    }
}
