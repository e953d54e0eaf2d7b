use crate::{error::LayerError, result::Result, scalar::Scalar};
use anyhow::bail;
use ndarray::{Dimension, IntoDimension, IxDyn};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

/// Shared, reference counted storage for the data or diff of a [`Blob`].
///
/// Cloning does not copy, it aliases the storage.
pub struct SyncedMemory<T> {
    inner: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for SyncedMemory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Scalar> SyncedMemory<T> {
    fn zeros(len: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vec![T::zero(); len])),
        }
    }
    fn from_vec(vec: Vec<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vec)),
        }
    }
    /// The number of allocated elements.
    pub fn len(&self) -> usize {
        self.inner.read_recursive().len()
    }
    /// Whether no elements are allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Whether `self` and `other` alias the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
    fn read(&self, count: usize) -> MappedRwLockReadGuard<'_, [T]> {
        // Recursive so that aliased bottoms and tops can be read at the same time.
        RwLockReadGuard::map(self.inner.read_recursive(), |vec| &vec[..count])
    }
    fn write(&self, count: usize) -> MappedRwLockWriteGuard<'_, [T]> {
        RwLockWriteGuard::map(self.inner.write(), |vec| &mut vec[..count])
    }
}

/// A dense n-dimensional buffer with a paired gradient ("diff") buffer of the same shape.
///
/// Blobs are owned by the network and lent to layers for the duration of a call. The data
/// and diff are held in [`SyncedMemory`], so that blobs may share storage (see
/// [`.share_data()`](Blob::share_data)).
pub struct Blob<T: Scalar> {
    shape: IxDyn,
    count: usize,
    data: SyncedMemory<T>,
    diff: SyncedMemory<T>,
}

impl<T: Scalar> Blob<T> {
    /// Creates a zeroed blob with `shape`.
    pub fn new<E>(shape: E) -> Self
    where
        E: IntoDimension,
    {
        let shape = shape.into_dimension().into_dyn();
        let count = shape.size();
        Self {
            shape,
            count,
            data: SyncedMemory::zeros(count),
            diff: SyncedMemory::zeros(count),
        }
    }
    /// Creates a blob with a single element and no axes.
    pub fn scalar() -> Self {
        Self::new(IxDyn(&[]))
    }
    /// Creates a blob with `shape` and `data`. The diff is zeroed.
    ///
    /// **Errors**
    ///
    /// The length of `data` does not match the product of `shape`.
    pub fn from_shape_vec<E>(shape: E, data: Vec<T>) -> Result<Self>
    where
        E: IntoDimension,
    {
        let shape = shape.into_dimension().into_dyn();
        let count = shape.size();
        if data.len() != count {
            bail!(LayerError::ShapeMismatch {
                expected: shape.slice().to_vec(),
                count: data.len(),
            });
        }
        Ok(Self {
            shape,
            count,
            data: SyncedMemory::from_vec(data),
            diff: SyncedMemory::zeros(count),
        })
    }
    /// The dimensions of the blob.
    pub fn shape(&self) -> &[usize] {
        self.shape.slice()
    }
    /// The number of axes.
    pub fn num_axes(&self) -> usize {
        self.shape.ndim()
    }
    /// The number of elements, the product of the shape.
    pub fn count(&self) -> usize {
        self.count
    }
    /// The product of the dimensions in `start .. end`.
    ///
    /// **Panics**
    ///
    /// If `start > end` or `end > num_axes`.
    pub fn count_range(&self, start: usize, end: usize) -> usize {
        self.shape()[start..end].iter().product()
    }
    /// The product of the dimensions from `start` to the last axis.
    pub fn count_from(&self, start: usize) -> usize {
        self.count_range(start, self.num_axes())
    }
    /// Resolves a possibly negative `axis` to an index into the shape.
    ///
    /// **Errors**
    ///
    /// Unless `-num_axes <= axis < num_axes`.
    pub fn canonical_axis_index(&self, axis: isize) -> Result<usize> {
        let num_axes = self.num_axes() as isize;
        if axis < -num_axes || axis >= num_axes {
            bail!(LayerError::AxisOutOfRange {
                axis,
                shape: self.shape().to_vec(),
            });
        }
        Ok(if axis < 0 { axis + num_axes } else { axis } as usize)
    }
    /// The dimension of a possibly negative `axis`.
    ///
    /// See [`.canonical_axis_index()`](Blob::canonical_axis_index).
    pub fn shape_at(&self, axis: isize) -> Result<usize> {
        Ok(self.shape()[self.canonical_axis_index(axis)?])
    }
    /// Reshapes the blob.
    ///
    /// Storage is only reallocated if the new count exceeds the allocated capacity, in which
    /// case both the data and the diff are reallocated (zeroed) and any sharing with other
    /// blobs ends. Shrinking keeps the storage, but only the first `count` elements are
    /// visible afterwards.
    pub fn reshape<E>(&mut self, shape: E)
    where
        E: IntoDimension,
    {
        let shape = shape.into_dimension().into_dyn();
        let count = shape.size();
        if count > self.data.len() || count > self.diff.len() {
            self.data = SyncedMemory::zeros(count);
            self.diff = SyncedMemory::zeros(count);
        }
        self.shape = shape;
        self.count = count;
    }
    /// Reshapes to the shape of `other`.
    pub fn reshape_like(&mut self, other: &Self) {
        self.reshape(other.shape.clone());
    }
    /// The data (activations).
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [T]> {
        self.data.read(self.count)
    }
    /// The data, mutably.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [T]> {
        self.data.write(self.count)
    }
    /// The diff (gradient).
    pub fn diff(&self) -> MappedRwLockReadGuard<'_, [T]> {
        self.diff.read(self.count)
    }
    /// The diff, mutably.
    pub fn diff_mut(&mut self) -> MappedRwLockWriteGuard<'_, [T]> {
        self.diff.write(self.count)
    }
    /// The data and the diff, mutably.
    ///
    /// For backward passes that read the data while writing the diff.
    pub fn data_and_diff_mut(
        &mut self,
    ) -> (MappedRwLockReadGuard<'_, [T]>, MappedRwLockWriteGuard<'_, [T]>) {
        (self.data.read(self.count), self.diff.write(self.count))
    }
    /// Shares the data storage of `other`, without copying.
    ///
    /// **Errors**
    ///
    /// The counts of the blobs are not equal.
    pub fn share_data(&mut self, other: &Self) -> Result<()> {
        self.check_count(other)?;
        self.data = other.data.clone();
        Ok(())
    }
    /// Shares the diff storage of `other`, without copying.
    ///
    /// **Errors**
    ///
    /// The counts of the blobs are not equal.
    pub fn share_diff(&mut self, other: &Self) -> Result<()> {
        self.check_count(other)?;
        self.diff = other.diff.clone();
        Ok(())
    }
    fn check_count(&self, other: &Self) -> Result<()> {
        if self.count != other.count {
            bail!(LayerError::ShapeMismatch {
                expected: self.shape().to_vec(),
                count: other.count,
            });
        }
        Ok(())
    }
    /// Whether the data of `self` and `other` is the same storage.
    pub fn shares_data_with(&self, other: &Self) -> bool {
        self.data.ptr_eq(&other.data)
    }
    /// Whether the diff of `self` and `other` is the same storage.
    pub fn shares_diff_with(&self, other: &Self) -> bool {
        self.diff.ptr_eq(&other.diff)
    }
    /// Fills the data with `value`.
    pub fn set_data(&mut self, value: T) {
        self.data_mut().fill(value);
    }
    /// Fills the diff with `value`.
    pub fn set_diff(&mut self, value: T) {
        self.diff_mut().fill(value);
    }
    /// Copies the data into a vec.
    pub fn to_vec(&self) -> Vec<T> {
        self.data().to_vec()
    }
    /// Copies the diff into a vec.
    pub fn diff_to_vec(&self) -> Vec<T> {
        self.diff().to_vec()
    }
}

impl<T: Scalar> Debug for Blob<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Blob")
            .field("scalar_type", &T::scalar_type())
            .field("shape", &self.shape())
            .finish()
    }
}
