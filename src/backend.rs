use crate::scalar::Scalar;
use rayon::prelude::*;

/// Minimum elements per rayon task for [`Backend::parallel()`].
pub const DEFAULT_MIN_LEN: usize = 4096;

/// Executes elementwise kernels.
///
/// Every operation applies a pure function per element with no dependency between elements,
/// so [`Serial`](Backend::Serial) and [`Parallel`](Backend::Parallel) produce identical
/// results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, derive_more::Display)]
pub enum Backend {
    /// A plain loop on the calling thread.
    #[default]
    #[display(fmt = "Serial")]
    Serial,
    /// Data parallel dispatch on the rayon thread pool, at least `min_len` elements per task.
    #[display(fmt = "Parallel(min_len = {})", min_len)]
    Parallel {
        #[allow(missing_docs)]
        min_len: usize,
    },
}

impl Backend {
    /// Parallel backend with [`DEFAULT_MIN_LEN`].
    pub fn parallel() -> Self {
        Self::Parallel {
            min_len: DEFAULT_MIN_LEN,
        }
    }
    /// `y[i] = f(x[i])`
    pub fn map<T, F>(&self, x: &[T], y: &mut [T], f: F)
    where
        T: Scalar,
        F: Fn(T) -> T + Send + Sync,
    {
        debug_assert_eq!(x.len(), y.len());
        match *self {
            Self::Serial => {
                for (y, x) in y.iter_mut().zip(x) {
                    *y = f(*x);
                }
            }
            Self::Parallel { min_len } => {
                y.par_iter_mut()
                    .zip(x.par_iter())
                    .with_min_len(min_len.max(1))
                    .for_each(|(y, x)| *y = f(*x));
            }
        }
    }
    /// `y[i] = f(y[i])`
    pub fn map_inplace<T, F>(&self, y: &mut [T], f: F)
    where
        T: Scalar,
        F: Fn(T) -> T + Send + Sync,
    {
        match *self {
            Self::Serial => {
                for y in y.iter_mut() {
                    *y = f(*y);
                }
            }
            Self::Parallel { min_len } => {
                y.par_iter_mut()
                    .with_min_len(min_len.max(1))
                    .for_each(|y| *y = f(*y));
            }
        }
    }
    /// `y[i] = f(a[i], b[i], c[i])`
    pub fn zip_map<T, F>(&self, a: &[T], b: &[T], c: &[T], y: &mut [T], f: F)
    where
        T: Scalar,
        F: Fn(T, T, T) -> T + Send + Sync,
    {
        debug_assert_eq!(a.len(), y.len());
        debug_assert_eq!(b.len(), y.len());
        debug_assert_eq!(c.len(), y.len());
        match *self {
            Self::Serial => {
                for (i, y) in y.iter_mut().enumerate() {
                    *y = f(a[i], b[i], c[i]);
                }
            }
            Self::Parallel { min_len } => {
                y.par_iter_mut()
                    .zip(a.par_iter().zip(b.par_iter().zip(c.par_iter())))
                    .with_min_len(min_len.max(1))
                    .for_each(|(y, (a, (b, c)))| *y = f(*a, *b, *c));
            }
        }
    }
    /// `y[i] = f(a[i], b[i], y[i])`
    pub fn zip_map_inplace<T, F>(&self, a: &[T], b: &[T], y: &mut [T], f: F)
    where
        T: Scalar,
        F: Fn(T, T, T) -> T + Send + Sync,
    {
        debug_assert_eq!(a.len(), y.len());
        debug_assert_eq!(b.len(), y.len());
        match *self {
            Self::Serial => {
                for (i, y) in y.iter_mut().enumerate() {
                    *y = f(a[i], b[i], *y);
                }
            }
            Self::Parallel { min_len } => {
                y.par_iter_mut()
                    .zip(a.par_iter().zip(b.par_iter()))
                    .with_min_len(min_len.max(1))
                    .for_each(|(y, (a, b))| *y = f(*a, *b, *y));
            }
        }
    }
    /// `y[i] = value`
    pub fn fill<T: Scalar>(&self, y: &mut [T], value: T) {
        self.map_inplace(y, move |_| value);
    }
    /// `y[i] = x[i]`
    pub fn copy<T: Scalar>(&self, x: &[T], y: &mut [T]) {
        match *self {
            Self::Serial => y.copy_from_slice(x),
            Self::Parallel { .. } => self.map(x, y, |x| x),
        }
    }
    /// `y[i] *= alpha`
    pub fn scale<T: Scalar>(&self, y: &mut [T], alpha: T) {
        self.map_inplace(y, move |y| y * alpha);
    }
    /// `y[i] += alpha`
    pub fn add_scalar<T: Scalar>(&self, y: &mut [T], alpha: T) {
        self.map_inplace(y, move |y| y + alpha);
    }
    /// `y[i] = y[i]^power`
    pub fn powx<T: Scalar>(&self, y: &mut [T], power: T) {
        self.map_inplace(y, move |y| y.powf(power));
    }
    /// `y[i] = |x[i]|`
    pub fn abs<T: Scalar>(&self, x: &[T], y: &mut [T]) {
        self.map(x, y, T::abs);
    }
}
