//! Typed views over visibility cubes, and maps of views which can be iterated
//! one channel "column" at a time.
//!
//! Every cube handled by this crate has the axes `[correlation][channel][row]`.
//! A column is the one dimensional channel vector obtained by fixing a
//! correlation and a row. A [`DataCubeMap`] holds one view per [`DataColumn`]
//! (`DATA`, `FLAG`, `WEIGHT_SPECTRUM`) and walks all of them in lock-step, so
//! that the data, flags and weights of a column always line up.
//!
//! Views borrow caller-owned storage. A view registered with
//! [`DataCubeView::write`] writes through to the caller's array.
//!
//! # Examples
//!
//! ```rust
//! use chanavg::{
//!     cube::{DataColumn, DataCubeMap, DataCubeView},
//!     ndarray::Array3,
//! };
//!
//! let data = Array3::from_shape_fn((2, 4, 3), |(c, ch, r)| (c * 100 + ch * 10 + r) as f32);
//! let flags = Array3::from_elem((2, 4, 3), false);
//!
//! let mut cube_map = DataCubeMap::new();
//! cube_map.add_column(DataColumn::Data, DataCubeView::read(data.view())).unwrap();
//! cube_map.add_column(DataColumn::Flag, DataCubeView::read(flags.view())).unwrap();
//!
//! cube_map.setup_column_iteration();
//! let mut visited = 0;
//! while !cube_map.past_end() {
//!     let column = cube_map.vector::<f32>(DataColumn::Data).unwrap();
//!     assert_eq!(column.len(), 4);
//!     visited += 1;
//!     cube_map.advance();
//! }
//! assert_eq!(visited, 2 * 3);
//! ```

use std::{collections::BTreeMap, fmt::Display};

use ndarray::{s, ArrayView1, ArrayView3, ArrayViewMut1, ArrayViewMut3, Axis};
use num_complex::Complex;
use thiserror::Error;

/// The logical columns a [`DataCubeMap`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataColumn {
    /// The quantity being averaged (visibilities, weights, frequencies, ...)
    Data,
    /// Boolean flags, `true` is bad.
    Flag,
    /// Per-channel weights used by the weighted kernel.
    WeightSpectrum,
}

impl Display for DataColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Data => "DATA",
                Self::Flag => "FLAG",
                Self::WeightSpectrum => "WEIGHT_SPECTRUM",
            }
        )
    }
}

/// The element types a [`DataCubeView`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// `bool`
    Bool,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `Complex<f32>`
    Complex,
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Bool => "bool",
                Self::Float => "f32",
                Self::Double => "f64",
                Self::Complex => "Complex<f32>",
            }
        )
    }
}

#[derive(Error, Debug)]
/// Errors raised while building or reading a [`DataCubeMap`]
pub enum CubeMapError {
    #[error("column {column} is already registered in this cube map")]
    /// A view was added under a key which is already taken.
    DuplicateColumn {
        /// The offending column
        column: DataColumn,
    },

    #[error("column {column} is not registered in this cube map")]
    /// A view was requested which was never added.
    MissingColumn {
        /// The missing column
        column: DataColumn,
    },

    #[error("column {column} holds {found} elements, but {expected} was requested")]
    /// A view was requested with the wrong element type.
    TypeMismatch {
        /// The column requested
        column: DataColumn,
        /// The element type that was requested
        expected: ElementKind,
        /// The element type actually stored
        found: ElementKind,
    },

    #[error("column {column} was registered read-only")]
    /// A mutable vector was requested from a read-only view.
    ReadOnlyColumn {
        /// The column requested
        column: DataColumn,
    },

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    /// Error for bad array shape in provided argument
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },
}

/// Borrowed storage for a single cube, either read-only or write-through.
#[derive(Debug)]
pub enum CubeStorage<'a, T> {
    /// A read-only view
    Read(ArrayView3<'a, T>),
    /// A mutable view, writes go straight to the caller's array
    Write(ArrayViewMut3<'a, T>),
}

impl<'a, T> CubeStorage<'a, T> {
    /// The `(correlation, channel, row)` shape of the storage.
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Read(view) => view.dim(),
            Self::Write(view) => view.dim(),
        }
    }

    fn column(&self, corr_idx: usize, row_idx: usize) -> ArrayView1<'_, T> {
        match self {
            Self::Read(view) => view.slice(s![corr_idx, .., row_idx]),
            Self::Write(view) => view.slice(s![corr_idx, .., row_idx]),
        }
    }

    fn column_mut(&mut self, corr_idx: usize, row_idx: usize) -> Option<ArrayViewMut1<'_, T>> {
        match self {
            Self::Read(_) => None,
            Self::Write(view) => Some(view.slice_mut(s![corr_idx, .., row_idx])),
        }
    }
}

/// A typed view over one cube. The set of element types is closed, see
/// [`ElementKind`].
#[derive(Debug)]
pub enum DataCubeView<'a> {
    /// flags
    Bool(CubeStorage<'a, bool>),
    /// weights, sigmas, single dish data
    Float(CubeStorage<'a, f32>),
    /// frequencies and channel widths
    Double(CubeStorage<'a, f64>),
    /// complex visibilities
    Complex(CubeStorage<'a, Complex<f32>>),
}

/// An element type which can be stored in a [`DataCubeView`].
pub trait CubeElement: Copy + Send + Sync + 'static {
    /// The [`ElementKind`] matching this type.
    const KIND: ElementKind;

    /// Wrap typed storage into the matching [`DataCubeView`] variant.
    fn wrap(storage: CubeStorage<'_, Self>) -> DataCubeView<'_>;

    /// Get the typed storage out of a view, if the view holds this type.
    fn storage<'v, 'a>(view: &'v DataCubeView<'a>) -> Option<&'v CubeStorage<'a, Self>>;

    /// Get the typed storage out of a view mutably, if the view holds this type.
    fn storage_mut<'v, 'a>(view: &'v mut DataCubeView<'a>)
        -> Option<&'v mut CubeStorage<'a, Self>>;
}

macro_rules! impl_cube_element {
    ($t:ty, $variant:ident) => {
        impl CubeElement for $t {
            const KIND: ElementKind = ElementKind::$variant;

            fn wrap(storage: CubeStorage<'_, Self>) -> DataCubeView<'_> {
                DataCubeView::$variant(storage)
            }

            fn storage<'v, 'a>(view: &'v DataCubeView<'a>) -> Option<&'v CubeStorage<'a, Self>> {
                match view {
                    DataCubeView::$variant(storage) => Some(storage),
                    _ => None,
                }
            }

            fn storage_mut<'v, 'a>(
                view: &'v mut DataCubeView<'a>,
            ) -> Option<&'v mut CubeStorage<'a, Self>> {
                match view {
                    DataCubeView::$variant(storage) => Some(storage),
                    _ => None,
                }
            }
        }
    };
}

impl_cube_element!(bool, Bool);
impl_cube_element!(f32, Float);
impl_cube_element!(f64, Double);
impl_cube_element!(Complex<f32>, Complex);

impl<'a> DataCubeView<'a> {
    /// A read-only view over a cube.
    pub fn read<T: CubeElement>(cube: ArrayView3<'a, T>) -> Self {
        T::wrap(CubeStorage::Read(cube))
    }

    /// A write-through view over a cube.
    pub fn write<T: CubeElement>(cube: ArrayViewMut3<'a, T>) -> Self {
        T::wrap(CubeStorage::Write(cube))
    }

    /// A read-only view over a single vector, seen as a cube of shape `(1, n, 1)`.
    pub fn read_vector<T: CubeElement>(vector: ArrayView1<'a, T>) -> Self {
        Self::read(vector.insert_axis(Axis(0)).insert_axis(Axis(2)))
    }

    /// A write-through view over a single vector, seen as a cube of shape `(1, n, 1)`.
    pub fn write_vector<T: CubeElement>(vector: ArrayViewMut1<'a, T>) -> Self {
        Self::write(vector.insert_axis(Axis(0)).insert_axis(Axis(2)))
    }

    /// The element type held by this view.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Bool(_) => ElementKind::Bool,
            Self::Float(_) => ElementKind::Float,
            Self::Double(_) => ElementKind::Double,
            Self::Complex(_) => ElementKind::Complex,
        }
    }

    /// The `(correlation, channel, row)` shape of the underlying cube.
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Bool(storage) => storage.dim(),
            Self::Float(storage) => storage.dim(),
            Self::Double(storage) => storage.dim(),
            Self::Complex(storage) => storage.dim(),
        }
    }
}

/// A collection of [`DataCubeView`]s keyed by [`DataColumn`], iterated in
/// lock-step over `(correlation, row)` columns.
///
/// All views in one map share a shape.
#[derive(Debug, Default)]
pub struct DataCubeMap<'a> {
    cubes: BTreeMap<DataColumn, DataCubeView<'a>>,
    shape: Option<(usize, usize, usize)>,
    cursor: usize,
}

impl<'a> DataCubeMap<'a> {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `view` under `column`.
    ///
    /// # Errors
    ///
    /// - [`CubeMapError::DuplicateColumn`] if `column` is already registered.
    /// - [`CubeMapError::BadArrayShape`] if the view's shape differs from the views
    ///   already registered.
    pub fn add_column(
        &mut self,
        column: DataColumn,
        view: DataCubeView<'a>,
    ) -> Result<(), CubeMapError> {
        if self.cubes.contains_key(&column) {
            return Err(CubeMapError::DuplicateColumn { column });
        }
        let dim = view.dim();
        match self.shape {
            Some(shape) if shape != dim => {
                return Err(CubeMapError::BadArrayShape {
                    argument: format!("view ({column})"),
                    function: "DataCubeMap::add_column".into(),
                    expected: format!("{shape:?}"),
                    received: format!("{dim:?}"),
                });
            }
            Some(_) => {}
            None => self.shape = Some(dim),
        }
        self.cubes.insert(column, view);
        Ok(())
    }

    /// Whether a view is registered under `column`.
    pub fn has_column(&self, column: DataColumn) -> bool {
        self.cubes.contains_key(&column)
    }

    /// The element type registered under `column`, if any.
    pub fn kind(&self, column: DataColumn) -> Option<ElementKind> {
        self.cubes.get(&column).map(DataCubeView::kind)
    }

    /// The shared `(correlation, channel, row)` shape, `None` while empty.
    pub fn dim(&self) -> Option<(usize, usize, usize)> {
        self.shape
    }

    /// The number of channels in each column.
    pub fn column_length(&self) -> usize {
        self.shape.map_or(0, |(_, num_chans, _)| num_chans)
    }

    /// The number of `(correlation, row)` columns.
    pub fn num_columns(&self) -> usize {
        self.shape
            .map_or(0, |(num_corrs, _, num_rows)| num_corrs * num_rows)
    }

    /// Rewind the cursor to the first column.
    pub fn setup_column_iteration(&mut self) {
        self.cursor = 0;
    }

    /// Move every view to the next column. Does nothing once past the end.
    pub fn advance(&mut self) {
        if !self.past_end() {
            self.cursor += 1;
        }
    }

    /// Whether every column has been visited.
    pub fn past_end(&self) -> bool {
        self.cursor >= self.num_columns()
    }

    /// The `(correlation, row)` indices of the current column.
    pub fn position(&self) -> (usize, usize) {
        let num_rows = self.shape.map_or(1, |(_, _, num_rows)| num_rows.max(1));
        (self.cursor / num_rows, self.cursor % num_rows)
    }

    fn lookup<T: CubeElement>(
        &self,
        column: DataColumn,
    ) -> Result<&CubeStorage<'a, T>, CubeMapError> {
        let view = self
            .cubes
            .get(&column)
            .ok_or(CubeMapError::MissingColumn { column })?;
        T::storage(view).ok_or(CubeMapError::TypeMismatch {
            column,
            expected: T::KIND,
            found: view.kind(),
        })
    }

    /// The channel vector of the current column for `column`.
    ///
    /// # Errors
    ///
    /// - [`CubeMapError::MissingColumn`] if `column` is not registered
    /// - [`CubeMapError::TypeMismatch`] if it does not hold `T`
    pub fn vector<T: CubeElement>(
        &self,
        column: DataColumn,
    ) -> Result<ArrayView1<'_, T>, CubeMapError> {
        let (corr_idx, row_idx) = self.position();
        Ok(self.lookup::<T>(column)?.column(corr_idx, row_idx))
    }

    /// The mutable channel vector of the current column for `column`.
    ///
    /// # Errors
    ///
    /// - [`CubeMapError::MissingColumn`] if `column` is not registered
    /// - [`CubeMapError::TypeMismatch`] if it does not hold `T`
    /// - [`CubeMapError::ReadOnlyColumn`] if it was registered with [`DataCubeView::read`]
    pub fn vector_mut<T: CubeElement>(
        &mut self,
        column: DataColumn,
    ) -> Result<ArrayViewMut1<'_, T>, CubeMapError> {
        let (corr_idx, row_idx) = self.position();
        let view = self
            .cubes
            .get_mut(&column)
            .ok_or(CubeMapError::MissingColumn { column })?;
        let found = view.kind();
        T::storage_mut(view)
            .ok_or(CubeMapError::TypeMismatch {
                column,
                expected: T::KIND,
                found,
            })?
            .column_mut(corr_idx, row_idx)
            .ok_or(CubeMapError::ReadOnlyColumn { column })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array3};
    use num_complex::Complex;

    use super::{CubeMapError, DataColumn, DataCubeMap, DataCubeView, ElementKind};

    #[test]
    fn test_add_column_rejects_duplicates() {
        let flags = Array3::from_elem((1, 2, 1), false);
        let mut cube_map = DataCubeMap::new();
        cube_map
            .add_column(DataColumn::Flag, DataCubeView::read(flags.view()))
            .unwrap();
        assert!(matches!(
            cube_map.add_column(DataColumn::Flag, DataCubeView::read(flags.view())),
            Err(CubeMapError::DuplicateColumn {
                column: DataColumn::Flag
            })
        ));
    }

    #[test]
    fn test_add_column_rejects_mismatched_shape() {
        let flags = Array3::from_elem((2, 4, 3), false);
        let weights = Array3::from_elem((2, 4, 5), 1_f32);
        let mut cube_map = DataCubeMap::new();
        cube_map
            .add_column(DataColumn::Flag, DataCubeView::read(flags.view()))
            .unwrap();
        assert!(matches!(
            cube_map.add_column(DataColumn::WeightSpectrum, DataCubeView::read(weights.view())),
            Err(CubeMapError::BadArrayShape { .. })
        ));
        assert!(!cube_map.has_column(DataColumn::WeightSpectrum));
    }

    #[test]
    fn test_vector_errors() {
        let weights = Array3::from_elem((1, 3, 1), 1_f32);
        let mut cube_map = DataCubeMap::new();
        cube_map
            .add_column(DataColumn::WeightSpectrum, DataCubeView::read(weights.view()))
            .unwrap();

        assert!(matches!(
            cube_map.vector::<f32>(DataColumn::Data),
            Err(CubeMapError::MissingColumn {
                column: DataColumn::Data
            })
        ));
        match cube_map.vector::<Complex<f32>>(DataColumn::WeightSpectrum) {
            Err(CubeMapError::TypeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, ElementKind::Complex);
                assert_eq!(found, ElementKind::Float);
            }
            other => panic!("expected a type mismatch, got {other:?}"),
        }
        assert!(matches!(
            cube_map.vector_mut::<f32>(DataColumn::WeightSpectrum),
            Err(CubeMapError::ReadOnlyColumn { .. })
        ));
    }

    #[test]
    fn test_iteration_visits_columns_in_order() {
        let data = Array3::from_shape_fn((2, 3, 2), |(corr, chan, row)| {
            (corr * 100 + chan * 10 + row) as f32
        });
        let flags = Array3::from_shape_fn((2, 3, 2), |(corr, _, row)| corr == 1 && row == 0);
        let mut cube_map = DataCubeMap::new();
        cube_map
            .add_column(DataColumn::Data, DataCubeView::read(data.view()))
            .unwrap();
        cube_map
            .add_column(DataColumn::Flag, DataCubeView::read(flags.view()))
            .unwrap();
        assert_eq!(cube_map.column_length(), 3);
        assert_eq!(cube_map.num_columns(), 4);

        cube_map.setup_column_iteration();
        let mut positions = vec![];
        while !cube_map.past_end() {
            let (corr, row) = cube_map.position();
            let data_column = cube_map.vector::<f32>(DataColumn::Data).unwrap();
            let flag_column = cube_map.vector::<bool>(DataColumn::Flag).unwrap();
            assert_eq!(data_column[1], (corr * 100 + 10 + row) as f32);
            assert!(flag_column.iter().all(|&f| f == (corr == 1 && row == 0)));
            positions.push((corr, row));
            cube_map.advance();
        }
        assert_eq!(positions, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        // advancing past the end is harmless
        cube_map.advance();
        assert!(cube_map.past_end());
    }

    #[test]
    fn test_write_through() {
        let mut output = Array3::from_elem((1, 2, 2), 0_f32);
        {
            let mut cube_map = DataCubeMap::new();
            cube_map
                .add_column(DataColumn::Data, DataCubeView::write(output.view_mut()))
                .unwrap();
            cube_map.setup_column_iteration();
            while !cube_map.past_end() {
                let (_, row) = cube_map.position();
                let mut column = cube_map.vector_mut::<f32>(DataColumn::Data).unwrap();
                column[1] = row as f32 + 1.;
                cube_map.advance();
            }
        }
        assert_eq!(output[(0, 1, 0)], 1.);
        assert_eq!(output[(0, 1, 1)], 2.);
        assert_eq!(output[(0, 0, 1)], 0.);
    }

    #[test]
    fn test_vector_views() {
        let freqs = Array1::from(vec![1e8, 2e8, 3e8]);
        let mut cube_map = DataCubeMap::new();
        cube_map
            .add_column(DataColumn::Data, DataCubeView::read_vector(freqs.view()))
            .unwrap();
        assert_eq!(cube_map.dim(), Some((1, 3, 1)));
        assert_eq!(cube_map.kind(DataColumn::Data), Some(ElementKind::Double));
        cube_map.setup_column_iteration();
        assert_eq!(cube_map.vector::<f64>(DataColumn::Data).unwrap()[2], 3e8);
        cube_map.advance();
        assert!(cube_map.past_end());
    }

    #[test]
    fn test_empty_map_is_past_end() {
        let mut cube_map = DataCubeMap::new();
        cube_map.setup_column_iteration();
        assert!(cube_map.past_end());
        assert_eq!(cube_map.column_length(), 0);
    }
}
