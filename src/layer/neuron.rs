//! Helpers for elementwise layers with one bottom and one top.
//!
//! Storage may be aliased (in-place computation, see [`Blob::share_data()`]). Aliased buffers
//! are locked once and updated in place, instead of locking the same storage for both reading
//! and writing.

use crate::{backend::Backend, blob::Blob, result::Result, scalar::Scalar};

pub(super) fn reshape<T: Scalar>(bottom: &[&Blob<T>], top: &mut [&mut Blob<T>]) -> Result<()> {
    top[0].reshape_like(bottom[0]);
    Ok(())
}

/// `top.data[i] = f(bottom.data[i])`
pub(super) fn forward_map<T, F>(backend: &Backend, bottom: &Blob<T>, top: &mut Blob<T>, f: F)
where
    T: Scalar,
    F: Fn(T) -> T + Send + Sync,
{
    if top.shares_data_with(bottom) {
        let mut y = top.data_mut();
        backend.map_inplace(&mut y, f);
    } else {
        let x = bottom.data();
        let mut y = top.data_mut();
        backend.map(&x, &mut y, f);
    }
}

/// `bottom.diff[i] = f(bottom.data[i], top.data[i], top.diff[i])`
pub(super) fn backward_map<T, F>(backend: &Backend, top: &Blob<T>, bottom: &mut Blob<T>, f: F)
where
    T: Scalar,
    F: Fn(T, T, T) -> T + Send + Sync,
{
    let in_place = bottom.shares_diff_with(top);
    let (x, mut dx) = bottom.data_and_diff_mut();
    let y = top.data();
    if in_place {
        backend.zip_map_inplace(&x, &y, &mut dx, f);
    } else {
        let dy = top.diff();
        backend.zip_map(&x, &y, &dy, &mut dx, f);
    }
}
