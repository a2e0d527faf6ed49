//! End-to-end demo: mesh session plus a forwarded plugin call
//!
//! Opens a session on an in-memory host, forwards the buffers to the
//! mathlib worker's rotate_scale function and writes the transformed
//! vertices back. Build the worker binary first:
//!
//! ```text
//! cargo build --bins
//! cargo run --example rotate_scale -- target/debug
//! ```

use gangway::{ForwarderConfig, Library, Matrix, MemoryHost, MeshSession, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let worker_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "target/debug".to_string());

    // A unit quad in the XY plane
    let mut host = MemoryHost::new();
    let mesh = host.add_mesh(
        vec![
            0.0, 0.0, 0.0, // Vertex 0
            1.0, 0.0, 0.0, // Vertex 1
            1.0, 1.0, 0.0, // Vertex 2
            0.0, 1.0, 0.0, // Vertex 3
        ],
        vec![
            0, 1, 2, // Triangle 0
            0, 2, 3, // Triangle 1
        ],
    );
    let object = host.add_mesh_object(mesh);
    host.set_active(object);

    let library = Library::with_config(
        "mathlib",
        ForwarderConfig {
            search_dirs: vec![worker_dir.into()],
            ..Default::default()
        },
    );

    let mut session = MeshSession::open_active(&mut host)?;
    println!("Vertex 1 before: {:?}", session.vertices[1]);

    // 90 degree rotation about Z
    let rotation = Matrix::from_rows(&[
        [0.0, -1.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
    ]);
    let result = library.invoke(
        "rotate_scale",
        vec![
            Matrix::from_rows(&session.vertices).into(),
            Matrix::from_rows(&session.triangles).into(),
            rotation.into(),
        ],
    )?;

    let rotated = match result {
        Value::FloatMatrix(matrix) => matrix,
        other => return Err(format!("unexpected result kind: {}", other.kind()).into()),
    };
    session.vertices = rotated.into_rows::<3>()?;
    session.close()?;

    // The quad is now rotated 90 degrees and twice as large
    println!("Vertex 1 after: {:?}", &host.vertices(mesh)[3..6]);
    println!("Demo completed successfully!");
    Ok(())
}
