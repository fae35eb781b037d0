//! Numeric helpers shared by the detection stages.

mod bbox;

pub use bbox::{Aabb, GlobalBox};

/// MAD to standard deviation for normally distributed data.
pub const MAD_TO_SIGMA: f32 = 1.4826;

/// Median of a mutable slice (partially reorders it).
///
/// Even-length input averages the two middle elements.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;
    let (left, right_median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let right = *right_median;

    if len % 2 == 1 {
        right
    } else {
        let left = left.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (left + right) * 0.5
    }
}

/// Sigma-clipped median and sigma (MAD based).
///
/// Each iteration keeps values within `kappa * sigma` of the current median.
/// `values` is reordered; `deviations` is scratch space.
pub fn sigma_clipped_median(
    values: &mut [f32],
    deviations: &mut Vec<f32>,
    kappa: f32,
    iterations: usize,
) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let mut len = values.len();
    let mut median = median_f32_mut(&mut values[..len]);
    let mut sigma = 0.0;

    for _ in 0..iterations {
        let active = &mut values[..len];
        median = median_f32_mut(active);

        deviations.clear();
        deviations.extend(active.iter().map(|v| (v - median).abs()));
        sigma = median_f32_mut(deviations) * MAD_TO_SIGMA;

        if sigma < f32::EPSILON || len < 3 {
            return (median, sigma);
        }

        // Move kept values to the front.
        let limit = kappa * sigma;
        let mut write = 0;
        for read in 0..len {
            if (values[read] - median).abs() <= limit {
                values.swap(write, read);
                write += 1;
            }
        }
        if write == len || write == 0 {
            break;
        }
        len = write;
    }

    (median, sigma)
}
