/// Normalizes a set of backend weights into an ALB/NLB `ForwardConfig`
/// weight list (spec.md §4.4 step 5: "Weighted backends emit a single
/// forward action whose `ForwardConfig` lists all target groups with their
/// weights (sum normalized)").
///
/// AWS requires each target group weight to be an integer in `0..=999`.
/// When every input weight is zero (Gateway API permits this; it means
/// "send no traffic here"), every output weight is zero too — callers
/// forwarding a rule whose targets are all zero-weighted should instead
/// emit a fixed 503, which is decided one layer up in the Model Builder.
pub fn normalize_weights(weights: &[u16]) -> Vec<u16> {
    let total: u32 = weights.iter().map(|&w| w as u32).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }
    weights
        .iter()
        .map(|&w| ((w as u32 * 999) / total) as u16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_30_70() {
        let out = normalize_weights(&[30, 70]);
        assert_eq!(out[0] + out[1], 999);
        // Roughly 30:70, within rounding.
        assert!((out[0] as f64 / 999.0 - 0.3).abs() < 0.01);
    }

    #[test]
    fn all_zero_stays_zero() {
        assert_eq!(normalize_weights(&[0, 0]), vec![0, 0]);
    }

    #[test]
    fn single_backend_gets_everything() {
        assert_eq!(normalize_weights(&[5]), vec![999]);
    }
}
