//! Values exchanged with plugin workers.
//!
//! Geometry crosses the process boundary as dense row-major matrices, so
//! everything here is plain data with serde derives and no host handles.

use serde::{Deserialize, Serialize};

/// Dense row-major matrix.
///
/// Mesh buffers travel as `Matrix<f64>` (vertex positions, one row per
/// vertex) and `Matrix<i32>` (triangle corner indices, one row per
/// triangle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy> Matrix<T> {
    /// Build a matrix from a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, String> {
        let expected = rows.checked_mul(cols);
        if expected != Some(data.len()) {
            return Err(format!(
                "matrix shape {}x{} needs {} values, got {}",
                rows,
                cols,
                expected.unwrap_or(usize::MAX),
                data.len()
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix where every cell holds `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a matrix from fixed-width rows.
    pub fn from_rows<const N: usize>(rows: &[[T; N]]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * N);
        for row in rows {
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols: N,
            data,
        }
    }

    /// Split the matrix back into fixed-width rows.
    ///
    /// Fails when `N` does not match the column count.
    pub fn into_rows<const N: usize>(self) -> Result<Vec<[T; N]>, String> {
        if N == 0 {
            return Err("rows must have at least one column".to_string());
        }
        if self.cols != N {
            return Err(format!("matrix has {} columns, expected {}", self.cols, N));
        }
        let mut rows = Vec::with_capacity(self.rows);
        for chunk in self.data.chunks_exact(N) {
            let mut row = [chunk[0]; N];
            row.copy_from_slice(chunk);
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cell at `row`, `col`. Panics when the position is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> T {
        assert!(row < self.rows && col < self.cols, "matrix index out of bounds");
        self.data[row * self.cols + col]
    }

    /// Flat row-major view of the cells.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable flat row-major view of the cells.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the matrix and return the flat buffer.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

/// A single argument or result of a forwarded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    FloatMatrix(Matrix<f64>),
    IntMatrix(Matrix<i32>),
}

impl Value {
    /// Human-readable name of the variant, used in argument errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::FloatMatrix(_) => "float matrix",
            Value::IntMatrix(_) => "int matrix",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value. Integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float_matrix(&self) -> Option<&Matrix<f64>> {
        match self {
            Value::FloatMatrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_int_matrix(&self) -> Option<&Matrix<i32>> {
        match self {
            Value::IntMatrix(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Matrix<f64>> for Value {
    fn from(value: Matrix<f64>) -> Self {
        Value::FloatMatrix(value)
    }
}

impl From<Matrix<i32>> for Value {
    fn from(value: Matrix<i32>) -> Self {
        Value::IntMatrix(value)
    }
}
