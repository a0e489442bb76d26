use faer::linalg::matmul::matmul;
use faer::{Accum, ColMut, ColRef, MatRef, Par, unzip, zip};

use crate::E;

pub(crate) fn cwise_multiply(x1: ColRef<'_, E>, x2: ColRef<'_, E>, out: ColMut<'_, E>) {
    zip!(x1, x2, out).for_each(|unzip!(x1, x2, out)| *out = *x1 * *x2);
}

pub(crate) fn cwise_quotient(x1: ColRef<'_, E>, x2: ColRef<'_, E>, out: ColMut<'_, E>) {
    zip!(x1, x2, out).for_each(|unzip!(x1, x2, out)| *out = *x1 / *x2);
}

/// `y = alpha * A x`, or `y += alpha * A x` with [`Accum::Add`].
pub(crate) fn mat_vec(
    y: ColMut<'_, E>,
    accum: Accum,
    a: MatRef<'_, E>,
    x: ColRef<'_, E>,
    alpha: E,
) {
    matmul(y.as_mat_mut(), accum, a, x.as_mat(), alpha, Par::Seq);
}

/// `y += alpha * x`
pub(crate) fn axpy(alpha: E, x: ColRef<'_, E>, y: ColMut<'_, E>) {
    zip!(x, y).for_each(|unzip!(x, y)| *y += alpha * *x);
}

pub(crate) fn negate(x: ColMut<'_, E>) {
    zip!(x).for_each(|unzip!(x)| *x = -*x);
}

pub(crate) fn dot<'a>(x1: ColRef<'a, E>, x2: ColRef<'a, E>) -> E {
    let mut sum = 0.;

    zip!(x1, x2).for_each(|unzip!(x1, x2)| sum += *x1 * *x2);

    sum
}

/// Infinity norm; zero for an empty vector.
pub(crate) fn norm_inf<'a>(x: ColRef<'a, E>) -> E {
    let mut norm: E = 0.;

    zip!(x).for_each(|unzip!(x)| norm = E::max(norm, x.abs()));

    norm
}

pub(crate) fn has_nan<'a>(x: ColRef<'a, E>) -> bool {
    let mut res = false;
    zip!(x).for_each(|unzip!(x)| {
        if x.is_nan() {
            res = true
        }
    });
    res
}

pub(crate) fn is_col_positive<'a>(x: ColRef<'a, E>) -> bool {
    let mut res = true;
    zip!(x).for_each(|unzip!(x)| {
        if *x <= 0. {
            res = false
        }
    });
    res
}

#[cfg(test)]
mod tests {
    use faer::{Col, Mat};

    use super::*;

    fn col(data: &[E]) -> Col<E> {
        Col::from_fn(data.len(), |i| data[i])
    }

    #[test]
    fn test_mat_vec() {
        let a = Mat::from_fn(2, 3, |i, j| (i * 3 + j) as E);
        let x = col(&[1.0, -1.0, 2.0]);
        let mut y = col(&[1.0, 1.0]);
        mat_vec(y.as_mut(), Accum::Add, a.as_ref(), x.as_ref(), 2.0);
        assert_eq!(y, col(&[1.0 + 2.0 * 3.0, 1.0 + 2.0 * 9.0]));
        let mut z = col(&[5.0, 5.0, 5.0]);
        mat_vec(z.as_mut(), Accum::Replace, a.transpose(), col(&[1.0, 1.0]).as_ref(), 1.0);
        assert_eq!(z, col(&[3.0, 5.0, 7.0]));
    }

    #[test]
    fn test_cwise() {
        let x = col(&[1.0, -2.0, 3.0]);
        let y = col(&[2.0, 4.0, -1.0]);
        let mut out = Col::<E>::zeros(3);
        cwise_multiply(x.as_ref(), y.as_ref(), out.as_mut());
        assert_eq!(out, col(&[2.0, -8.0, -3.0]));
        cwise_quotient(x.as_ref(), y.as_ref(), out.as_mut());
        assert_eq!(out, col(&[0.5, -0.5, -3.0]));
    }

    #[test]
    fn test_axpy_and_dot() {
        let x = col(&[1.0, -2.0, 3.0]);
        let mut y = col(&[1.0, 1.0, 1.0]);
        axpy(2.0, x.as_ref(), y.as_mut());
        assert_eq!(y, col(&[3.0, -3.0, 7.0]));
        assert_eq!(dot(x.as_ref(), y.as_ref()), 3.0 + 6.0 + 21.0);
        negate(y.as_mut());
        assert_eq!(y, col(&[-3.0, 3.0, -7.0]));
    }

    #[test]
    fn test_norm_inf() {
        assert_eq!(norm_inf(col(&[1.0, -5.0, 3.0]).as_ref()), 5.0);
        assert_eq!(norm_inf(Col::<E>::zeros(0).as_ref()), 0.0);
    }

    #[test]
    fn test_is_col_positive() {
        assert!(is_col_positive(col(&[1.0, 2.0, 3.0]).as_ref()));
        assert!(!is_col_positive(col(&[1.0, -2.0, 3.0]).as_ref()));
    }

    #[test]
    fn test_has_nan() {
        assert!(!has_nan(col(&[1.0, 2.0]).as_ref()));
        assert!(has_nan(col(&[1.0, E::NAN]).as_ref()));
    }
}
