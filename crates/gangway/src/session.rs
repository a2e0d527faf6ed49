//! Scoped access to a mesh's vertex and triangle buffers.
//!
//! A [`MeshSession`] copies the buffers out of the host on open and writes
//! them back on [`close`](MeshSession::close), bracketing the whole exchange
//! with mode switches: the host is forced into object mode while buffers are
//! copied, and bounced through edit mode after write-back so it recomputes
//! derived mesh state. Whatever mode the host was in beforehand is restored
//! when the session ends, on every path including early drop.

use crate::host::{EditorHost, EditorMode, ObjectKind};
use thiserror::Error;
use tracing::{debug, warn};

/// Largest vertex or triangle count the 32-bit index format can address.
const INDEX_LIMIT: usize = i32::MAX as usize;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The session target carries no mesh data.
    #[error("Cannot open mesh session: '{kind}' is not a mesh")]
    NotAMesh { kind: String },

    #[error("Cannot open mesh session: no active object")]
    NoActiveObject,

    /// The mesh is too large for 32-bit triangle indices.
    #[error("{what} count {count} exceeds the 32-bit index range")]
    CountOverflow { what: &'static str, count: usize },

    /// A triangle corner points outside the vertex buffer.
    #[error("Triangle {triangle} references vertex {index}, outside 0..{vertex_count}")]
    IndexOverflow {
        triangle: usize,
        index: i64,
        vertex_count: usize,
    },

    /// Session buffers changed length; the host owns the topology.
    #[error("The {buffer} buffer was resized during the session ({actual} rows, expected {expected})")]
    BufferResized {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// An open borrow of one mesh's buffers.
///
/// `vertices` holds one `[x, y, z]` position per vertex and `triangles` one
/// `[a, b, c]` corner-index triple per triangle. Both may be mutated freely
/// while the session is open; nothing reaches the host until
/// [`close`](Self::close), which validates the buffers first and writes
/// either everything or nothing.
pub struct MeshSession<'h, H: EditorHost> {
    host: &'h mut H,
    mesh: H::Mesh,
    initial_mode: EditorMode,
    /// Vertex positions, one row per vertex.
    pub vertices: Vec<[f64; 3]>,
    /// Triangle corners, indices into `vertices`.
    pub triangles: Vec<[i32; 3]>,
    finished: bool,
}

impl<'h, H: EditorHost> MeshSession<'h, H> {
    /// Open a session on an object, which must carry mesh data.
    pub fn open(host: &'h mut H, object: &H::Object) -> Result<Self, SessionError> {
        let kind = host.object_kind(object);
        match kind {
            ObjectKind::Mesh(mesh) => Self::open_mesh(host, mesh),
            ObjectKind::Other(kind) => Err(SessionError::NotAMesh { kind }),
        }
    }

    /// Open a session on the host's active object.
    pub fn open_active(host: &'h mut H) -> Result<Self, SessionError> {
        let object = host.active_object().ok_or(SessionError::NoActiveObject)?;
        Self::open(host, &object)
    }

    /// Open a session directly on a mesh handle.
    pub fn open_mesh(host: &'h mut H, mesh: H::Mesh) -> Result<Self, SessionError> {
        let initial_mode = host.mode();
        // Buffers are only coherent in object mode; other modes may hold
        // uncommitted edits.
        host.set_mode(EditorMode::Object);

        let vertex_count = host.vertex_count(&mesh);
        let triangle_count = host.triangle_count(&mesh);
        if vertex_count > INDEX_LIMIT {
            host.set_mode(initial_mode);
            return Err(SessionError::CountOverflow {
                what: "Vertex",
                count: vertex_count,
            });
        }
        if triangle_count > INDEX_LIMIT {
            host.set_mode(initial_mode);
            return Err(SessionError::CountOverflow {
                what: "Triangle",
                count: triangle_count,
            });
        }

        let mut flat_vertices = vec![0.0; vertex_count * 3];
        host.read_vertices(&mesh, &mut flat_vertices);
        let vertices = flat_vertices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        let mut flat_triangles = vec![0i64; triangle_count * 3];
        host.read_triangles(&mesh, &mut flat_triangles);
        let mut triangles = Vec::with_capacity(triangle_count);
        for (triangle, corners) in flat_triangles.chunks_exact(3).enumerate() {
            let mut row = [0i32; 3];
            for (slot, &index) in row.iter_mut().zip(corners) {
                if index < 0 || index >= vertex_count as i64 {
                    host.set_mode(initial_mode);
                    return Err(SessionError::IndexOverflow {
                        triangle,
                        index,
                        vertex_count,
                    });
                }
                // Fits: vertex_count is at most INDEX_LIMIT.
                *slot = index as i32;
            }
            triangles.push(row);
        }

        debug!(
            "Opened mesh session: {} vertices, {} triangles, restoring to {:?}",
            vertex_count, triangle_count, initial_mode
        );
        Ok(Self {
            host,
            mesh,
            initial_mode,
            vertices,
            triangles,
            finished: false,
        })
    }

    /// Mode the host was in when the session opened.
    pub fn initial_mode(&self) -> EditorMode {
        self.initial_mode
    }

    /// Validate the buffers, write them back and restore the host's mode.
    ///
    /// Validation happens before any write: on error the host keeps its
    /// original buffers and only the mode is restored.
    pub fn close(mut self) -> Result<(), SessionError> {
        self.finished = true;

        let vertex_count = self.host.vertex_count(&self.mesh);
        let triangle_count = self.host.triangle_count(&self.mesh);
        if self.vertices.len() != vertex_count {
            self.host.set_mode(self.initial_mode);
            return Err(SessionError::BufferResized {
                buffer: "vertex",
                expected: vertex_count,
                actual: self.vertices.len(),
            });
        }
        if self.triangles.len() != triangle_count {
            self.host.set_mode(self.initial_mode);
            return Err(SessionError::BufferResized {
                buffer: "triangle",
                expected: triangle_count,
                actual: self.triangles.len(),
            });
        }
        for (triangle, corners) in self.triangles.iter().enumerate() {
            for &index in corners {
                if index < 0 || index as usize >= vertex_count {
                    self.host.set_mode(self.initial_mode);
                    return Err(SessionError::IndexOverflow {
                        triangle,
                        index: i64::from(index),
                        vertex_count,
                    });
                }
            }
        }

        let flat_vertices: Vec<f64> = self.vertices.iter().flatten().copied().collect();
        self.host.write_vertices(&self.mesh, &flat_vertices);
        let flat_triangles: Vec<i64> = self
            .triangles
            .iter()
            .flatten()
            .map(|&index| i64::from(index))
            .collect();
        self.host.write_triangles(&self.mesh, &flat_triangles);

        // Edit mode forces the host to rebuild derived mesh state from the
        // fresh buffers before the original mode comes back.
        self.host.set_mode(EditorMode::Edit);
        self.host.set_mode(self.initial_mode);
        debug!(
            "Closed mesh session: wrote {} vertices, {} triangles",
            vertex_count, triangle_count
        );
        Ok(())
    }

    /// Abandon the session: restore the host's mode, write nothing back.
    pub fn discard(mut self) {
        self.finished = true;
        self.host.set_mode(self.initial_mode);
        debug!("Discarded mesh session");
    }
}

impl<'h, H: EditorHost> Drop for MeshSession<'h, H> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Mesh session dropped without close; restoring mode, skipping write-back");
            self.host.set_mode(self.initial_mode);
        }
    }
}

/// Run `f` inside a session on `object`: commit on success, discard on error.
pub fn scope<H, T, E, F>(host: &mut H, object: &H::Object, f: F) -> Result<T, E>
where
    H: EditorHost,
    E: From<SessionError>,
    F: FnOnce(&mut MeshSession<'_, H>) -> Result<T, E>,
{
    let mut session = MeshSession::open(host, object)?;
    match f(&mut session) {
        Ok(value) => {
            session.close()?;
            Ok(value)
        }
        Err(err) => {
            session.discard();
            Err(err)
        }
    }
}

/// [`scope`] over the host's active object.
pub fn scope_active<H, T, E, F>(host: &mut H, f: F) -> Result<T, E>
where
    H: EditorHost,
    E: From<SessionError>,
    F: FnOnce(&mut MeshSession<'_, H>) -> Result<T, E>,
{
    let mut session = MeshSession::open_active(host)?;
    match f(&mut session) {
        Ok(value) => {
            session.close()?;
            Ok(value)
        }
        Err(err) => {
            session.discard();
            Err(err)
        }
    }
}
