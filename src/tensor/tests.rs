//! Tests for the tensor substrate.

use super::*;
use approx::assert_abs_diff_eq;

#[test]
fn test_from_vec_shape_and_len() {
    let t = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(t.shape(), &[2, 3]);
    assert_eq!(t.ndim(), 2);
    assert_eq!(t.len(), 6);
}

#[test]
#[should_panic(expected = "cannot fill shape")]
fn test_from_vec_rejects_size_mismatch() {
    Tensor::from_vec(&[2, 3], vec![1.0, 2.0]);
}

#[test]
fn test_broadcast_shape_trailing_alignment() {
    assert_eq!(broadcast_shape(&[2, 3], &[3]), vec![2, 3]);
    assert_eq!(broadcast_shape(&[2, 1], &[1, 3]), vec![2, 3]);
    assert_eq!(broadcast_shape(&[4, 1, 5], &[2, 5]), vec![4, 2, 5]);
    assert_eq!(broadcast_shape(&[3], &[3]), vec![3]);
}

#[test]
#[should_panic(expected = "cannot broadcast")]
fn test_broadcast_shape_rejects_incompatible_extents() {
    broadcast_shape(&[2, 3], &[4]);
}

#[test]
fn test_add_broadcasts_row_vector() {
    let a = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = Tensor::from_vec(&[3], vec![10.0, 20.0, 30.0]);
    let c = a.add(&b);
    assert_eq!(c.shape(), &[2, 3]);
    assert_eq!(c.as_slice(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
}

#[test]
fn test_mul_broadcasts_both_operands() {
    let a = Tensor::from_vec(&[2, 1], vec![2.0, 3.0]);
    let b = Tensor::from_vec(&[1, 3], vec![1.0, 10.0, 100.0]);
    let c = a.mul(&b);
    assert_eq!(c.shape(), &[2, 3]);
    assert_eq!(c.as_slice(), &[2.0, 20.0, 200.0, 3.0, 30.0, 300.0]);
}

#[test]
fn test_sum_axis_with_and_without_keepdims() {
    let t = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let squeezed = t.sum_axis(0, false);
    assert_eq!(squeezed.shape(), &[3]);
    assert_eq!(squeezed.as_slice(), &[5.0, 7.0, 9.0]);

    let kept = t.sum_axis(1, true);
    assert_eq!(kept.shape(), &[2, 1]);
    assert_eq!(kept.as_slice(), &[6.0, 15.0]);
}

#[test]
fn test_reshape_preserves_order() {
    let t = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let r = t.reshape(&[3, 2]);
    assert_eq!(r.shape(), &[3, 2]);
    assert_eq!(r.as_slice(), t.as_slice());
}

#[test]
#[should_panic(expected = "cannot reshape")]
fn test_reshape_rejects_size_mismatch() {
    Tensor::zeros(&[2, 3]).reshape(&[4, 2]);
}

#[test]
fn test_gemm_plain() {
    // [1 2 3]   [7  8]
    // [4 5 6] . [9 10]  = [58 64; 139 154]
    //           [11 12]
    let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
    let mut out = [0.0f32; 4];
    gemm(&a, false, &b, false, 2, 3, 2, &mut out);
    assert_eq!(out, [58.0, 64.0, 139.0, 154.0]);
}

#[test]
fn test_gemm_transposed_lhs() {
    // a stored 3x2, used as its 2x3 transpose
    let a = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
    let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
    let mut out = [0.0f32; 4];
    gemm(&a, true, &b, false, 2, 3, 2, &mut out);
    assert_eq!(out, [58.0, 64.0, 139.0, 154.0]);
}

#[test]
fn test_gemm_transposed_rhs() {
    // b stored 2x3, used as its 3x2 transpose
    let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let b = [7.0, 9.0, 11.0, 8.0, 10.0, 12.0];
    let mut out = [0.0f32; 4];
    gemm(&a, false, &b, true, 2, 3, 2, &mut out);
    assert_eq!(out, [58.0, 64.0, 139.0, 154.0]);
}

#[test]
fn test_reduce_sum_and_mean() {
    let t = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_abs_diff_eq!(t.reduce_sum().scalar_value(), 10.0);
    assert_abs_diff_eq!(t.reduce_mean().scalar_value(), 2.5);
}

#[test]
fn test_has_nan() {
    let clean = Tensor::from_vec(&[2], vec![1.0, 2.0]);
    assert!(!clean.has_nan());
    let dirty = Tensor::from_vec(&[2], vec![1.0, f32::NAN]);
    assert!(dirty.has_nan());
}

#[test]
fn test_scaled_add() {
    let mut t = Tensor::from_vec(&[2], vec![1.0, 2.0]);
    let other = Tensor::from_vec(&[2], vec![10.0, 20.0]);
    t.scaled_add(0.5, &other);
    assert_eq!(t.as_slice(), &[6.0, 12.0]);
}

#[test]
fn test_glorot_uniform_stays_within_limit() {
    let t = Tensor::glorot_uniform(&[10, 20]);
    let limit = (6.0f32 / 30.0).sqrt();
    assert!(t.as_slice().iter().all(|v| v.abs() <= limit));
}

#[test]
fn test_random_standard_range() {
    let t = Tensor::random_standard(&[100]);
    assert!(t.as_slice().iter().all(|&v| (0.0..1.0).contains(&v)));
}

#[test]
fn test_randn_shape_and_spread() {
    let t = Tensor::randn(&[1000]);
    assert_eq!(t.shape(), &[1000]);
    let mean: f32 = t.as_slice().iter().sum::<f32>() / 1000.0;
    assert!(mean.abs() < 0.2);
}
