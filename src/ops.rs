//! Core operations for GPT-2 inference.

use rayon::prelude::*;

/// Floor on the layer-norm variance, keeps constant inputs finite.
pub const LN_EPS: f32 = 1e-7;

/// Coefficient of the tanh GELU approximation, sqrt(2 / pi).
const GELU_COEF: f32 = 0.797_884_6;

/// Layer normalization, aligned with nn.LayerNorm.forward.
///
/// The variance is floored at [`LN_EPS`] rather than offset by it.
#[inline]
pub fn layer_norm(dest: &mut [f32], src: &[f32], gamma: &[f32], beta: &[f32]) {
    let n = src.len() as f32;
    let mean = src.iter().sum::<f32>() / n;
    let var = src.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let inv = 1.0 / var.max(LN_EPS).sqrt();
    for i in 0..dest.len() {
        dest[i] = (src[i] - mean) * inv * gamma[i] + beta[i];
    }
}

/// Dot product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication with bias: xout = x @ w.T + b (w is row-major flattened).
///
/// Rows are computed in parallel; each output element is still a serial sum,
/// so the result does not depend on the thread count.
#[inline]
pub fn matmul(xout: &mut [f32], x: &[f32], w: &[f32], b: &[f32]) {
    let in_dim = x.len();
    xout.par_iter_mut().enumerate().for_each(|(i, out)| {
        let off = i * in_dim;
        *out = dot(x, &w[off..off + in_dim]) + b[i];
    });
}

/// Element-wise accumulation: a += b.
#[inline]
pub fn accum(a: &mut [f32], b: &[f32]) {
    for (ai, bi) in a.iter_mut().zip(b.iter()) {
        *ai += *bi;
    }
}

/// Softmax in-place.
#[inline]
pub fn softmax(x: &mut [f32]) {
    if x.is_empty() {
        return;
    }
    let max_val = x.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for xi in x.iter_mut() {
        *xi = (*xi - max_val).exp();
        sum += *xi;
    }
    for xi in x.iter_mut() {
        *xi /= sum;
    }
}

/// GELU activation (tanh approximation), aligned with NewGELUActivation.
#[inline]
pub fn gelu(x: &mut [f32]) {
    for v in x.iter_mut() {
        let u = *v;
        *v = 0.5 * u * (1.0 + (GELU_COEF * (u + 0.044715 * u * u * u)).tanh());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_matmul() {
        let x = vec![1.0, 2.0, 3.0];
        let w = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = vec![0.5, -1.0];
        let mut dest = vec![0.0; 2];

        matmul(&mut dest, &x, &w, &b);

        assert_eq!(14.5, dest[0]);
        assert_eq!(31.0, dest[1]);
    }

    #[test]
    fn test_gelu() {
        let mut x = vec![0.0, 1.0, -1.0, 10.0];
        gelu(&mut x);
        assert_eq!(0.0, x[0]);
        assert!((x[1] - 0.841192).abs() < 1e-5);
        assert!((x[2] + 0.158808).abs() < 1e-5);
        assert!((x[3] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_layer_norm_constant_input_stays_finite() {
        let x = vec![3.0; 8];
        let gamma = vec![2.0; 8];
        let beta = vec![0.25; 8];
        let mut dest = vec![0.0; 8];
        layer_norm(&mut dest, &x, &gamma, &beta);
        assert!(dest.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_layer_norm_affine() {
        let x = vec![1.0, 3.0];
        let gamma = vec![2.0, 0.5];
        let beta = vec![1.0, -1.0];
        let mut dest = vec![0.0; 2];
        layer_norm(&mut dest, &x, &gamma, &beta);
        assert!((dest[0] - -1.0).abs() < 1e-5);
        assert!((dest[1] - -0.5).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_empty() {
        let mut x: Vec<f32> = vec![];
        softmax(&mut x);
        assert!(x.is_empty());
    }

    proptest! {
        #[test]
        fn softmax_sums_to_one(mut x in prop::collection::vec(-50.0f32..50.0, 1..64)) {
            softmax(&mut x);
            let sum: f32 = x.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-4);
            prop_assert!(x.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }

        #[test]
        fn softmax_shift_invariant(
            x in prop::collection::vec(-20.0f32..20.0, 1..64),
            shift in -100.0f32..100.0,
        ) {
            let mut a = x.clone();
            let mut b: Vec<f32> = x.iter().map(|v| v + shift).collect();
            softmax(&mut a);
            softmax(&mut b);
            for (pa, pb) in a.iter().zip(b.iter()) {
                prop_assert!((pa - pb).abs() < 1e-4);
            }
        }

        #[test]
        fn layer_norm_standardizes(x in prop::collection::vec(-10.0f32..10.0, 2..128)) {
            let n = x.len() as f32;
            let mean = x.iter().sum::<f32>() / n;
            let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
            prop_assume!(var > 1e-2);

            let gamma = vec![1.0; x.len()];
            let beta = vec![0.0; x.len()];
            let mut y = vec![0.0; x.len()];
            layer_norm(&mut y, &x, &gamma, &beta);

            let y_mean = y.iter().sum::<f32>() / n;
            let y_var = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum::<f32>() / n;
            prop_assert!(y_mean.abs() < 1e-3);
            prop_assert!((y_var - 1.0).abs() < 1e-2);
        }
    }
}
