use crate::config::PAdjust;

/// Derive the corrected significance threshold from the recorded window
/// p-values
///
/// Runs once, single threaded, between the testing and assembly phases,
/// and returns the new alpha rather than mutating shared state.  The
/// denominator n_windows is the approximate genome wide window count,
/// not the number of recorded p-values: the Benjamini-Hochberg step-up
/// deliberately operates on the already filtered p-value set only (see
/// DESIGN.md).
pub fn adjust_alpha(
    method: PAdjust,
    alpha: f64,
    n_windows: u64,
    mut pvalues: Vec<f64>,
) -> f64 {
    if method == PAdjust::None {
        return alpha;
    }
    info!(
        "Adjusting p-values using method {} (N = {})",
        method, n_windows
    );
    let new_alpha = match method {
        PAdjust::None => alpha,
        PAdjust::Bonferroni => alpha / n_windows as f64,
        PAdjust::BenjaminiHochberg => {
            if pvalues.len() < 2 {
                warn!(
                    "Too few significant p-values ({}) for a step-up adjustment; alpha unchanged",
                    pvalues.len()
                );
                alpha
            } else {
                pvalues.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
                let n = n_windows as f64;
                let mut k = 0;
                while pvalues[k] <= alpha * k as f64 / n && k < pvalues.len() - 1 {
                    k += 1;
                }
                if k == 0 {
                    warn!("Step-up adjustment found no usable candidate; alpha unchanged");
                    alpha
                } else {
                    pvalues[k - 1]
                }
            }
        }
    };
    info!("New alpha = {:e}", new_alpha);
    new_alpha
}
