//! Small dense linear algebra for the shallow models

use super::registry::ModelError;

/// Row-major matrix whose shape is checked at construction
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build from nested rows; every row must have the same non-zero length
    pub fn from_rows(model: &str, rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.is_empty() || cols == 0 {
            return Err(ModelError::Shape {
                model: model.to_string(),
                detail: "matrix has no rows or columns".to_string(),
            });
        }
        if let Some(idx) = rows.iter().position(|r| r.len() != cols) {
            return Err(ModelError::Shape {
                model: model.to_string(),
                detail: format!("row {idx} has {} columns, expected {cols}", rows[idx].len()),
            });
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelError::Invalid {
                model: model.to_string(),
                detail: "matrix contains non-finite values".to_string(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    /// Fail unless the matrix is exactly `rows` x `cols`
    pub fn expect_shape(&self, model: &str, name: &str, rows: usize, cols: usize) -> Result<(), ModelError> {
        if self.rows != rows || self.cols != cols {
            return Err(ModelError::Shape {
                model: model.to_string(),
                detail: format!(
                    "{name} is {}x{}, expected {rows}x{cols}",
                    self.rows, self.cols
                ),
            });
        }
        Ok(())
    }

    /// `self * input`; `input.len()` must equal `cols`, checked at load time
    pub fn mul_vec(&self, input: &[f64]) -> Vec<f64> {
        (0..self.rows).map(|r| dot(self.row(r), input)).collect()
    }
}

/// Fail unless `values` has `len` finite entries
pub fn expect_vector(model: &str, name: &str, values: &[f64], len: usize) -> Result<(), ModelError> {
    if values.len() != len {
        return Err(ModelError::Shape {
            model: model.to_string(),
            detail: format!("{name} has {} entries, expected {len}", values.len()),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Invalid {
            model: model.to_string(),
            detail: format!("{name} contains non-finite values"),
        });
    }
    Ok(())
}

pub fn dot(left: &[f64], right: &[f64]) -> f64 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Numerically stable logistic
pub fn sigmoid(value: f64) -> f64 {
    if value >= 0.0 {
        1.0 / (1.0 + (-value).exp())
    } else {
        let exp = value.exp();
        exp / (1.0 + exp)
    }
}

pub fn relu(value: f64) -> f64 {
    value.max(0.0)
}

/// Softmax shifted by the max for stability
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_rows_are_rejected() {
        let err = Matrix::from_rows("t", &[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ModelError::Shape { .. }));
    }

    #[test]
    fn test_mul_vec() {
        let m = Matrix::from_rows("t", &[vec![1.0, 2.0], vec![0.0, -1.0]]).unwrap();
        assert_eq!(m.mul_vec(&[3.0, 4.0]), vec![11.0, -4.0]);
        assert!(m.expect_shape("t", "m", 2, 2).is_ok());
        assert!(m.expect_shape("t", "m", 2, 3).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let out = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        assert!((out.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(out[3] > 0.99);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
    }
}
