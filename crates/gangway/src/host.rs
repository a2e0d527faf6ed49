//! Capability interface to the editor that owns the scene.
//!
//! Mesh sessions talk to the editor only through [`EditorHost`], a narrow
//! surface of exactly the operations they need: find the active object,
//! classify it, switch interaction modes, and copy mesh buffers in and out.
//! [`MemoryHost`] implements it over plain vectors and records every mode
//! transition, which is what the test suites assert against.

use tracing::trace;

/// Interaction modes of the host editor.
///
/// Mesh buffers are only safe to copy while the editor sits in
/// [`EditorMode::Object`]; other modes may hold uncommitted edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Object,
    Edit,
    Sculpt,
    VertexPaint,
    WeightPaint,
}

impl Default for EditorMode {
    fn default() -> Self {
        EditorMode::Object
    }
}

/// What a scene object turned out to be.
#[derive(Debug, Clone)]
pub enum ObjectKind<M> {
    /// The object carries mesh data.
    Mesh(M),
    /// Anything else, named for diagnostics.
    Other(String),
}

/// The editor operations mesh sessions rely on.
///
/// `Mesh` and `Object` are host-side handles; the trait never exposes the
/// host's own geometry types, only flat buffers. Vertex buffers hold
/// `3 * vertex_count` coordinates, triangle buffers `3 * triangle_count`
/// corner indices, both row-major. Read and write calls expect slices of
/// exactly that length.
pub trait EditorHost {
    type Mesh: Clone;
    type Object;

    /// Currently selected object, if any.
    fn active_object(&self) -> Option<Self::Object>;

    /// Classify an object and surface its mesh data when it has any.
    fn object_kind(&self, object: &Self::Object) -> ObjectKind<Self::Mesh>;

    fn mode(&self) -> EditorMode;

    fn set_mode(&mut self, mode: EditorMode);

    fn vertex_count(&self, mesh: &Self::Mesh) -> usize;

    fn triangle_count(&self, mesh: &Self::Mesh) -> usize;

    /// Copy all vertex coordinates into `out`.
    fn read_vertices(&self, mesh: &Self::Mesh, out: &mut [f64]);

    /// Copy all triangle corner indices into `out`.
    fn read_triangles(&self, mesh: &Self::Mesh, out: &mut [i64]);

    /// Replace all vertex coordinates.
    fn write_vertices(&mut self, mesh: &Self::Mesh, data: &[f64]);

    /// Replace all triangle corner indices.
    fn write_triangles(&mut self, mesh: &Self::Mesh, data: &[i64]);
}

/// Handle to a mesh stored in a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshId(usize);

/// Handle to a scene object stored in a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(usize);

#[derive(Debug, Clone)]
struct MeshData {
    vertices: Vec<f64>,
    triangles: Vec<i64>,
}

#[derive(Debug, Clone)]
enum ObjectData {
    Mesh(MeshId),
    Other(String),
}

/// In-memory [`EditorHost`] for tests, examples and headless runs.
///
/// Starts in [`EditorMode::Object`] with no active object. Every
/// `set_mode` call is appended to a transition log so callers can assert
/// the exact mode bracketing a session performed.
#[derive(Debug, Default)]
pub struct MemoryHost {
    meshes: Vec<MeshData>,
    objects: Vec<ObjectData>,
    active: Option<ObjectId>,
    mode: EditorMode,
    transitions: Vec<EditorMode>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mesh from flat buffers and return its handle.
    ///
    /// `vertices` holds three coordinates per vertex, `triangles` three
    /// corner indices per triangle.
    pub fn add_mesh(&mut self, vertices: Vec<f64>, triangles: Vec<i64>) -> MeshId {
        debug_assert!(vertices.len() % 3 == 0);
        debug_assert!(triangles.len() % 3 == 0);
        let id = MeshId(self.meshes.len());
        self.meshes.push(MeshData { vertices, triangles });
        id
    }

    /// Add a scene object whose data is the given mesh.
    pub fn add_mesh_object(&mut self, mesh: MeshId) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(ObjectData::Mesh(mesh));
        id
    }

    /// Add a non-mesh scene object such as a camera or light.
    pub fn add_object(&mut self, kind: impl Into<String>) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(ObjectData::Other(kind.into()));
        id
    }

    pub fn set_active(&mut self, object: ObjectId) {
        self.active = Some(object);
    }

    /// Every mode set on this host, oldest first.
    pub fn transitions(&self) -> &[EditorMode] {
        &self.transitions
    }

    /// Flat vertex buffer of a stored mesh.
    pub fn vertices(&self, mesh: MeshId) -> &[f64] {
        &self.meshes[mesh.0].vertices
    }

    /// Flat triangle index buffer of a stored mesh.
    pub fn triangles(&self, mesh: MeshId) -> &[i64] {
        &self.meshes[mesh.0].triangles
    }
}

impl EditorHost for MemoryHost {
    type Mesh = MeshId;
    type Object = ObjectId;

    fn active_object(&self) -> Option<ObjectId> {
        self.active
    }

    fn object_kind(&self, object: &ObjectId) -> ObjectKind<MeshId> {
        match &self.objects[object.0] {
            ObjectData::Mesh(mesh) => ObjectKind::Mesh(*mesh),
            ObjectData::Other(kind) => ObjectKind::Other(kind.clone()),
        }
    }

    fn mode(&self) -> EditorMode {
        self.mode
    }

    fn set_mode(&mut self, mode: EditorMode) {
        trace!("Mode change: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.transitions.push(mode);
    }

    fn vertex_count(&self, mesh: &MeshId) -> usize {
        self.meshes[mesh.0].vertices.len() / 3
    }

    fn triangle_count(&self, mesh: &MeshId) -> usize {
        self.meshes[mesh.0].triangles.len() / 3
    }

    fn read_vertices(&self, mesh: &MeshId, out: &mut [f64]) {
        out.copy_from_slice(&self.meshes[mesh.0].vertices);
    }

    fn read_triangles(&self, mesh: &MeshId, out: &mut [i64]) {
        out.copy_from_slice(&self.meshes[mesh.0].triangles);
    }

    fn write_vertices(&mut self, mesh: &MeshId, data: &[f64]) {
        self.meshes[mesh.0].vertices.copy_from_slice(data);
    }

    fn write_triangles(&mut self, mesh: &MeshId, data: &[i64]) {
        self.meshes[mesh.0].triangles.copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_host_has_no_active_object() {
        let host = MemoryHost::new();
        assert!(host.active_object().is_none());
        assert_eq!(host.mode(), EditorMode::Object);
    }

    #[test]
    fn test_object_classification() {
        let mut host = MemoryHost::new();
        let mesh = host.add_mesh(vec![0.0; 9], vec![0, 1, 2]);
        let mesh_object = host.add_mesh_object(mesh);
        let camera = host.add_object("camera");

        assert!(matches!(
            host.object_kind(&mesh_object),
            ObjectKind::Mesh(m) if m == mesh
        ));
        assert!(matches!(
            host.object_kind(&camera),
            ObjectKind::Other(kind) if kind == "camera"
        ));
    }

    #[test]
    fn test_transition_log_records_every_set_mode() {
        let mut host = MemoryHost::new();
        host.set_mode(EditorMode::Sculpt);
        host.set_mode(EditorMode::Object);
        assert_eq!(host.transitions(), &[EditorMode::Sculpt, EditorMode::Object]);
        assert_eq!(host.mode(), EditorMode::Object);
    }

    #[test]
    fn test_buffer_round_trip() {
        let mut host = MemoryHost::new();
        let mesh = host.add_mesh(vec![1.0, 2.0, 3.0], vec![0, 0, 0]);

        let mut vertices = vec![0.0; 3];
        host.read_vertices(&mesh, &mut vertices);
        assert_eq!(vertices, vec![1.0, 2.0, 3.0]);

        host.write_vertices(&mesh, &[4.0, 5.0, 6.0]);
        assert_eq!(host.vertices(mesh), &[4.0, 5.0, 6.0]);
    }
}
