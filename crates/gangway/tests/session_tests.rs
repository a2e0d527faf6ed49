//! Integration tests for mesh sessions against the in-memory host

use gangway::{
    scope_active, EditorHost, EditorMode, MemoryHost, MeshId, MeshSession, ObjectId, SessionError,
};

/// Unit quad in the XY plane with an active mesh object
fn quad_host() -> (MemoryHost, MeshId, ObjectId) {
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
    (host, mesh, object)
}

#[test]
fn test_untouched_session_round_trips_buffers_exactly() {
    let mut host = MemoryHost::new();
    // Values with awkward bit patterns, compared bit for bit below
    let vertices = vec![
        0.1,
        -0.0,
        std::f64::consts::PI,
        1.0e-300,
        f64::MAX,
        2.0f64.powi(-52),
    ];
    let mesh = host.add_mesh(vertices, vec![0, 1, 1]);
    let object = host.add_mesh_object(mesh);

    let before: Vec<u64> = host.vertices(mesh).iter().map(|v| v.to_bits()).collect();
    let triangles_before = host.triangles(mesh).to_vec();

    let session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.close().expect("Failed to close session");

    let after: Vec<u64> = host.vertices(mesh).iter().map(|v| v.to_bits()).collect();
    assert_eq!(before, after);
    assert_eq!(host.triangles(mesh), triangles_before.as_slice());
}

#[test]
fn test_mutations_are_written_back() {
    let (mut host, mesh, object) = quad_host();

    let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.vertices[1] = [5.0, 6.0, 7.0];
    // Flip the winding of the first triangle
    session.triangles[0] = [2, 1, 0];
    session.close().expect("Failed to close session");

    assert_eq!(&host.vertices(mesh)[3..6], &[5.0, 6.0, 7.0]);
    assert_eq!(&host.triangles(mesh)[..3], &[2, 1, 0]);
    // The second triangle is untouched
    assert_eq!(&host.triangles(mesh)[3..], &[0, 2, 3]);
}

#[test]
fn test_mode_is_bracketed_and_restored() {
    let (mut host, _mesh, object) = quad_host();
    host.set_mode(EditorMode::Sculpt);
    let setup_len = host.transitions().len();

    let session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.close().expect("Failed to close session");

    assert_eq!(host.mode(), EditorMode::Sculpt);
    // Object mode for the copy, an edit bounce after write-back, then the
    // original mode again
    assert_eq!(
        &host.transitions()[setup_len..],
        &[EditorMode::Object, EditorMode::Edit, EditorMode::Sculpt]
    );
}

#[test]
fn test_non_mesh_object_is_rejected_without_mode_change() {
    let mut host = MemoryHost::new();
    let camera = host.add_object("camera");
    host.set_mode(EditorMode::Edit);
    let setup_len = host.transitions().len();

    let err = MeshSession::open(&mut host, &camera).err().expect("Expected an error");
    match err {
        SessionError::NotAMesh { kind } => assert_eq!(kind, "camera"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(host.mode(), EditorMode::Edit);
    assert_eq!(host.transitions().len(), setup_len);
}

#[test]
fn test_no_active_object_is_rejected() {
    let mut host = MemoryHost::new();
    let err = MeshSession::open_active(&mut host).err().expect("Expected an error");
    assert!(matches!(err, SessionError::NoActiveObject));
    assert!(host.transitions().is_empty());
}

#[test]
fn test_close_rejects_bad_index_and_writes_nothing() {
    let (mut host, mesh, object) = quad_host();
    host.set_mode(EditorMode::Sculpt);
    let setup_len = host.transitions().len();
    let vertices_before = host.vertices(mesh).to_vec();
    let triangles_before = host.triangles(mesh).to_vec();

    let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    // Mutate vertices too: a failed close must write back neither buffer
    session.vertices[0] = [9.0, 9.0, 9.0];
    session.triangles[1] = [0, 1, 9];
    let err = session.close().err().expect("Expected an error");

    match err {
        SessionError::IndexOverflow {
            triangle,
            index,
            vertex_count,
        } => {
            assert_eq!(triangle, 1);
            assert_eq!(index, 9);
            assert_eq!(vertex_count, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(host.vertices(mesh), vertices_before.as_slice());
    assert_eq!(host.triangles(mesh), triangles_before.as_slice());
    // Mode restored directly, no edit bounce without a write-back
    assert_eq!(host.mode(), EditorMode::Sculpt);
    assert_eq!(
        &host.transitions()[setup_len..],
        &[EditorMode::Object, EditorMode::Sculpt]
    );
}

#[test]
fn test_close_rejects_negative_index() {
    let (mut host, mesh, object) = quad_host();
    let triangles_before = host.triangles(mesh).to_vec();

    let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.triangles[0][0] = -1;
    let err = session.close().err().expect("Expected an error");

    assert!(matches!(
        err,
        SessionError::IndexOverflow { index: -1, .. }
    ));
    assert_eq!(host.triangles(mesh), triangles_before.as_slice());
}

#[test]
fn test_close_rejects_resized_buffers() {
    let (mut host, mesh, object) = quad_host();

    let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.vertices.push([0.5, 0.5, 0.5]);
    let err = session.close().err().expect("Expected an error");
    match err {
        SessionError::BufferResized {
            buffer,
            expected,
            actual,
        } => {
            assert_eq!(buffer, "vertex");
            assert_eq!(expected, 4);
            assert_eq!(actual, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(host.vertices(mesh).len(), 12);

    let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
    session.triangles.pop();
    let err = session.close().err().expect("Expected an error");
    assert!(matches!(
        err,
        SessionError::BufferResized {
            buffer: "triangle",
            expected: 2,
            actual: 1,
        }
    ));
}

#[test]
fn test_dropped_session_restores_mode_without_write_back() {
    let (mut host, mesh, object) = quad_host();
    host.set_mode(EditorMode::WeightPaint);
    let setup_len = host.transitions().len();
    let vertices_before = host.vertices(mesh).to_vec();

    {
        let mut session = MeshSession::open(&mut host, &object).expect("Failed to open session");
        session.vertices[0] = [3.0, 3.0, 3.0];
        // Dropped here without close
    }

    assert_eq!(host.vertices(mesh), vertices_before.as_slice());
    assert_eq!(host.mode(), EditorMode::WeightPaint);
    assert_eq!(
        &host.transitions()[setup_len..],
        &[EditorMode::Object, EditorMode::WeightPaint]
    );
}

#[test]
fn test_scope_active_commits_the_closure_result() {
    let (mut host, mesh, _object) = quad_host();

    let lifted: Result<f64, SessionError> = scope_active(&mut host, |session| {
        for row in &mut session.vertices {
            row[2] += 1.0;
        }
        Ok(session.vertices[0][2])
    });

    assert_eq!(lifted.expect("Scope failed"), 1.0);
    assert_eq!(host.vertices(mesh)[2], 1.0);
    assert_eq!(host.vertices(mesh)[5], 1.0);
}

#[test]
fn test_session_on_mesh_handle_without_object() {
    let mut host = MemoryHost::new();
    let mesh = host.add_mesh(vec![1.0, 2.0, 3.0], vec![0, 0, 0]);

    let mut session = MeshSession::open_mesh(&mut host, mesh).expect("Failed to open session");
    assert_eq!(session.initial_mode(), EditorMode::Object);
    session.vertices[0] = [4.0, 5.0, 6.0];
    session.close().expect("Failed to close session");

    assert_eq!(host.vertices(mesh), &[4.0, 5.0, 6.0]);
}
