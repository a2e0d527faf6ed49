//! Demo geometry plugin served over the call protocol
//!
//! Each invocation handles exactly one forwarded call on stdin/stdout, so
//! the binary is cheap to rebuild and swap while the calling editor keeps
//! running. All logging goes to stderr; stdout carries the wire protocol.

use clap::Parser;
use gangway::registry::Args as CallArgs;
use gangway::{CallError, Matrix, Registry, RegistryError, Value};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Demo geometry plugin served over the gangway call protocol"
)]
struct Args {
    /// List the registered functions and exit
    #[arg(long)]
    list: bool,
}

fn build_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new("mathlib")?;
    registry.register("describe", describe)?;
    registry.register("add", add)?;
    registry.register("add_matrices", add_matrices)?;
    registry.register("rotate_scale", rotate_scale)?;
    Ok(registry)
}

fn describe(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(0)?;
    Ok(Value::from(format!("mathlib {}", env!("CARGO_PKG_VERSION"))))
}

/// Add two numbers; the result stays an int when both inputs are ints
fn add(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(2)?;
    match (args.value(0)?, args.value(1)?) {
        (&Value::Int(a), &Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| CallError::failed("integer overflow")),
        _ => Ok(Value::Float(args.float(0)? + args.float(1)?)),
    }
}

/// Accumulate `additions` copies of the first matrix onto the second
fn add_matrices(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(3)?;
    let m1 = args.float_matrix(0)?;
    let m2 = args.float_matrix(1)?;
    let additions = args.int(2)?;

    if m1.rows() != m2.rows() || m1.cols() != m2.cols() {
        return Err(CallError::failed(format!(
            "matrix shapes differ: {}x{} vs {}x{}",
            m1.rows(),
            m1.cols(),
            m2.rows(),
            m2.cols()
        )));
    }
    if additions < 0 {
        return Err(CallError::failed("additions must be non-negative"));
    }

    let mut result = m2.clone();
    for _ in 0..additions {
        for (cell, &add) in result.data_mut().iter_mut().zip(m1.data()) {
            *cell += add;
        }
    }
    Ok(Value::FloatMatrix(result))
}

/// Rotate every vertex and double the result
///
/// Takes an Nx3 vertex matrix, an Mx3 triangle index matrix and a 3x3
/// rotation, logs triangle area statistics and returns the transformed
/// Nx3 vertex matrix.
fn rotate_scale(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(3)?;
    let vertices = args.float_matrix(0)?;
    let triangles = args.int_matrix(1)?;
    let rotation = args.float_matrix(2)?;

    if vertices.cols() != 3 {
        return Err(CallError::failed(format!(
            "vertex matrix must be Nx3, got {}x{}",
            vertices.rows(),
            vertices.cols()
        )));
    }
    if triangles.cols() != 3 {
        return Err(CallError::failed(format!(
            "triangle matrix must be Mx3, got {}x{}",
            triangles.rows(),
            triangles.cols()
        )));
    }
    if rotation.rows() != 3 || rotation.cols() != 3 {
        return Err(CallError::failed(format!(
            "rotation must be 3x3, got {}x{}",
            rotation.rows(),
            rotation.cols()
        )));
    }
    for t in 0..triangles.rows() {
        for corner in 0..3 {
            let index = triangles.get(t, corner);
            if index < 0 || index as usize >= vertices.rows() {
                return Err(CallError::failed(format!(
                    "triangle {} references vertex {}, outside 0..{}",
                    t,
                    index,
                    vertices.rows()
                )));
            }
        }
    }

    log_area_stats(vertices, triangles);

    // row' = row * R^T, scaled by 2
    let mut data = Vec::with_capacity(vertices.rows() * 3);
    for row in 0..vertices.rows() {
        for j in 0..3 {
            let mut sum = 0.0;
            for k in 0..3 {
                sum += vertices.get(row, k) * rotation.get(j, k);
            }
            data.push(sum * 2.0);
        }
    }
    Matrix::from_vec(vertices.rows(), 3, data)
        .map(Value::FloatMatrix)
        .map_err(CallError::failed)
}

/// Log min, max and spread of triangle areas, normalized by the mean
fn log_area_stats(vertices: &Matrix<f64>, triangles: &Matrix<i32>) {
    if triangles.rows() == 0 {
        return;
    }

    let corner = |t: usize, c: usize| -> [f64; 3] {
        let index = triangles.get(t, c) as usize;
        [
            vertices.get(index, 0),
            vertices.get(index, 1),
            vertices.get(index, 2),
        ]
    };

    let mut areas = Vec::with_capacity(triangles.rows());
    for t in 0..triangles.rows() {
        let a = corner(t, 0);
        let b = corner(t, 1);
        let c = corner(t, 2);
        let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let cross = [
            ab[1] * ac[2] - ab[2] * ac[1],
            ab[2] * ac[0] - ab[0] * ac[2],
            ab[0] * ac[1] - ab[1] * ac[0],
        ];
        let area = 0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
        areas.push(area);
    }

    let average = areas.iter().sum::<f64>() / areas.len() as f64;
    if average == 0.0 {
        info!("All {} triangles are degenerate", areas.len());
        return;
    }
    let min = areas.iter().copied().fold(f64::INFINITY, f64::min);
    let max = areas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sigma = (areas
        .iter()
        .map(|area| ((area - average) / average).powi(2))
        .sum::<f64>()
        / areas.len() as f64)
        .sqrt();

    info!(
        "Triangle areas (min/max)/avg: ({:.3}/{:.3}), sigma: {:.3}",
        min / average,
        max / average,
        sigma
    );
}

fn main() {
    let args = Args::parse();

    // Log to stderr only; stdout belongs to the wire protocol
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let registry = match build_registry() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("mathlib: {err}");
            std::process::exit(1);
        }
    };

    if args.list {
        for name in registry.function_names() {
            println!("{name}");
        }
        return;
    }

    if let Err(err) = gangway::serve(&registry) {
        eprintln!("mathlib: {err}");
        std::process::exit(1);
    }
}
