mod common;

use alphasolve_core::sync::packet::PacketKind;
use alphasolve_core::tree::TreeError;
use alphasolve_core::{
    builtin_registry, BuiltinExecutor, Cell, Packet, PacketError, Project, SessionService,
    SyncEvent, SyncEventKind, VariableType,
};
use common::{value_of, RecordingSink};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn session(cells: Vec<Cell>) -> (SessionService<RecordingSink>, RecordingSink) {
    let sink = RecordingSink::default();
    let service = SessionService::new(
        Project::new("shared").with_cells(cells),
        builtin_registry().expect("builtin registry"),
        Box::new(BuiltinExecutor::new()),
        sink.clone(),
    );
    (service, sink)
}

async fn propagated(cells: Vec<Cell>) -> (SessionService<RecordingSink>, RecordingSink) {
    let first = cells[0].id();
    let (mut service, sink) = session(cells);
    service.propagate_from(first).await.expect("initial propagation");
    (service, sink)
}

fn rejections(service: &mut SessionService<RecordingSink>) -> Arc<Mutex<Vec<SyncEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    service.subscribe(SyncEventKind::PacketRejected, move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    seen
}

fn value<'a>(cell: &'a Cell, name: &str) -> Option<&'a str> {
    value_of(cell.stored_context()?, name)
}

#[test]
fn create_packet_wire_shape_decodes() {
    let folder = uuid::Uuid::new_v4();
    let message = json!({
        "type": "CellCreate",
        "cell": {
            "type": "note",
            "id": "0b7e3f4e-9a55-4f1e-8f5e-1b2c3d4e5f60",
            "createdAt": "2026-03-01T08:00:00Z",
            "updatedAt": "2026-03-01T08:00:00Z",
            "content": "hello"
        },
        "index": 0,
        "parentCellId": folder,
        "timestamp": "2026-03-01T08:00:01Z"
    })
    .to_string();

    match Packet::decode(&message).expect("decode create") {
        Packet::CellCreate {
            cell,
            index,
            parent_cell_id,
            ..
        } => {
            assert_eq!(cell.editable_text(), "hello");
            assert_eq!(index, 0);
            assert_eq!(parent_cell_id, Some(folder));
        }
        other => panic!("unexpected packet {:?}", other.kind()),
    }
}

#[tokio::test]
async fn move_to_front_re_propagates_from_new_position() {
    let (mut service, _sink) = propagated(vec![
        Cell::equation("y=x+1"),
        Cell::equation("z=y*2"),
        Cell::note("n"),
        Cell::equation("x=2"),
    ])
    .await;
    let x_id = service.project().cells[3].id();
    assert_eq!(value(&service.project().cells[1], "z"), Some("y*2"));

    let event = service
        .apply_packet(Packet::cell_move(x_id, 3, 0))
        .await
        .expect("move applies");

    assert_eq!(
        event,
        SyncEvent::CellMoved {
            cell_id: x_id,
            from_index: 3,
            to_index: 0
        }
    );
    let cells = &service.project().cells;
    assert_eq!(cells[0].id(), x_id);
    assert_eq!(value(&cells[1], "y"), Some("3"));
    assert_eq!(value(&cells[2], "z"), Some("6"));
}

#[tokio::test]
async fn move_past_end_is_rejected_and_reported() {
    let (mut service, _sink) = session(vec![Cell::equation("x=1"), Cell::equation("y=2")]);
    let seen = rejections(&mut service);
    let before = service.project().clone();
    let first = before.cells[0].id();

    let err = service
        .apply_packet(Packet::cell_move(first, 0, 2))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "validation_error");
    assert_eq!(service.project(), &before);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        SyncEvent::PacketRejected {
            packet_kind, code, ..
        } => {
            assert_eq!(*packet_kind, Some(PacketKind::CellMove));
            assert_eq!(*code, "validation_error");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn stale_from_index_still_moves_the_cell() {
    let (mut service, _sink) = session(vec![
        Cell::note("a"),
        Cell::note("b"),
        Cell::note("c"),
    ]);
    let c_id = service.project().cells[2].id();

    let event = service
        .apply_packet(Packet::cell_move(c_id, 1, 0))
        .await
        .expect("mismatched index is tolerated");

    assert_eq!(
        event,
        SyncEvent::CellMoved {
            cell_id: c_id,
            from_index: 2,
            to_index: 0
        }
    );
    assert_eq!(service.project().cells[0].id(), c_id);
}

#[tokio::test]
async fn folder_move_leaves_nested_contexts_stale() {
    let (mut service, _sink) = propagated(vec![
        Cell::folder("f", vec![Cell::equation("w=x")]),
        Cell::equation("x=1"),
    ])
    .await;
    let folder_id = service.project().cells[0].id();

    service
        .apply_packet(Packet::cell_move(folder_id, 0, 1))
        .await
        .expect("folder move");

    let folder = &service.project().cells[1];
    let inner = &folder.children().expect("folder children")[0];
    let w = inner
        .stored_context()
        .and_then(|context| context.get("w"))
        .expect("w from first run");
    assert_eq!(w.kind, VariableType::Analytical);
    assert_eq!(w.first_value(), Some("x"));
}

#[tokio::test]
async fn create_into_folder_propagates_from_new_cell() {
    let (mut service, sink) = propagated(vec![Cell::folder("f", vec![Cell::equation("x=2")])]).await;
    let folder_id = service.project().cells[0].id();
    let created = Cell::equation("y=x+1");
    let created_id = created.id();

    let event = service
        .apply_packet(Packet::cell_create(created, 1, Some(folder_id)))
        .await
        .expect("create applies");

    assert_eq!(
        event,
        SyncEvent::CellCreated {
            cell_id: created_id,
            parent_cell_id: Some(folder_id),
            index: 1
        }
    );
    let children = service.project().cells[0].children().expect("folder");
    assert_eq!(children[1].id(), created_id);
    assert_eq!(value(&children[1], "y"), Some("3"));
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn create_into_unknown_folder_is_a_lookup_error() {
    let (mut service, _sink) = session(vec![Cell::note("only")]);
    let before = service.project().clone();

    let err = service
        .apply_packet(Packet::cell_create(
            Cell::note("orphan"),
            0,
            Some(uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "lookup_error");
    assert_eq!(service.project(), &before);
}

#[tokio::test]
async fn create_with_existing_id_is_rejected() {
    let existing = Cell::note("dup");
    let (mut service, _sink) = session(vec![existing.clone()]);

    let err = service
        .apply_packet(Packet::cell_create(existing, 1, None))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "validation_error");
    assert_eq!(service.project().cells.len(), 1);
}

#[tokio::test]
async fn delete_of_unknown_cell_is_a_lookup_error() {
    let (mut service, _sink) = session(vec![Cell::note("only")]);

    let err = service
        .apply_packet(Packet::cell_delete(uuid::Uuid::new_v4(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, PacketError::Lookup(_)));
    assert_eq!(service.project().cells.len(), 1);
}

#[tokio::test]
async fn deleting_an_equation_re_propagates_its_successor() {
    let (mut service, _sink) =
        propagated(vec![Cell::equation("x=2"), Cell::equation("y=x+1")]).await;
    let x_id = service.project().cells[0].id();
    assert_eq!(value(&service.project().cells[1], "y"), Some("3"));

    service
        .apply_packet(Packet::cell_delete(x_id, None))
        .await
        .expect("delete applies");

    let remaining = &service.project().cells[0];
    assert_eq!(value(remaining, "x"), None);
    assert_eq!(value(remaining, "y"), Some("x+1"));
}

#[tokio::test]
async fn update_with_mismatched_id_is_rejected() {
    let (mut service, _sink) = session(vec![Cell::equation("x=1")]);
    let addressed = service.project().cells[0].id();
    let message = serde_json::to_string(&Packet::CellUpdate {
        cell_id: addressed,
        cell: Cell::equation("x=9"),
        timestamp: chrono::Utc::now(),
    })
    .unwrap();

    let err = service.handle_message(&message).await.unwrap_err();

    assert_eq!(err.code(), "validation_error");
    assert_eq!(service.project().cells[0].editable_text(), "x=1");
}

#[tokio::test]
async fn malformed_message_does_not_block_later_packets() {
    let (mut service, _sink) = session(vec![Cell::equation("x=1")]);
    let seen = rejections(&mut service);
    let mut updated = service.project().cells[0].clone();
    updated.set_editable_text("x=4");

    let err = service.handle_message("{not json").await.unwrap_err();
    assert_eq!(err.code(), "decode_error");
    let err = service
        .handle_message(r#"{"type":"CellRename","timestamp":"2026-01-01T00:00:00Z"}"#)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "decode_error");

    let message = Packet::cell_update(updated).encode().unwrap();
    service
        .handle_message(&message)
        .await
        .expect("valid update after bad input");

    assert_eq!(seen.lock().unwrap().len(), 2);
    let cell = &service.project().cells[0];
    assert_eq!(cell.editable_text(), "x=4");
    assert_eq!(value(cell, "x"), Some("4"));
}

#[tokio::test]
async fn project_sync_replaces_tree_without_propagating() {
    let (mut service, _sink) = session(vec![Cell::note("mine")]);
    let incoming = Project::new("theirs").with_cells(vec![
        Cell::equation("x=2"),
        Cell::folder("f", vec![Cell::note("n")]),
    ]);

    let event = service
        .apply_packet(Packet::project_sync(incoming.clone()))
        .await
        .expect("sync applies");

    assert_eq!(event, SyncEvent::ProjectSynced { cell_count: 3 });
    assert_eq!(service.project(), &incoming);
    assert!(service.project().cells[0].stored_context().is_none());
}

#[tokio::test]
async fn received_cells_are_not_echoed_back() {
    let (mut service, sink) = session(vec![Cell::equation("x=1")]);
    let mut remote = service.project().cells[0].clone();
    remote.set_editable_text("x=7");
    let remote_id = remote.id();

    service
        .apply_packet(Packet::cell_update(remote))
        .await
        .expect("inbound update");
    assert!(!service.is_applying_inbound());
    assert!(sink.sent().is_empty());

    service
        .edit_cell_text(remote_id, "x=7")
        .await
        .expect("same text edit");
    assert!(sink.sent().is_empty());

    service
        .edit_cell_text(remote_id, "x=8")
        .await
        .expect("local edit");
    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Packet::CellUpdate { cell_id, cell, .. } => {
            assert_eq!(*cell_id, remote_id);
            assert_eq!(cell.editable_text(), "x=8");
            assert_eq!(value(cell, "x"), Some("8"));
        }
        other => panic!("unexpected packet {:?}", other.kind()),
    }
}

#[tokio::test]
async fn local_structure_edits_emit_matching_packets() {
    let (mut service, sink) = propagated(vec![Cell::equation("x=2")]).await;
    let sent_events = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&sent_events);
    service.subscribe(SyncEventKind::PacketSent, move |_| {
        *counter.lock().unwrap() += 1;
    });

    let folder_id = service
        .insert_cell(None, 1, Cell::folder("f", Vec::new()))
        .await
        .expect("insert folder");
    let y_id = service
        .insert_cell(None, 2, Cell::equation("y=x+1"))
        .await
        .expect("insert equation");
    service.move_cell(y_id, 0).await.expect("move equation");
    service.delete_cell(folder_id).await.expect("delete folder");

    let kinds: Vec<PacketKind> = sink.sent().iter().map(Packet::kind).collect();
    assert_eq!(
        kinds,
        vec![
            PacketKind::CellCreate,
            PacketKind::CellCreate,
            PacketKind::CellMove,
            PacketKind::CellDelete
        ]
    );
    assert_eq!(*sent_events.lock().unwrap(), 4);

    match &sink.sent()[1] {
        Packet::CellCreate { cell, .. } => assert_eq!(value(cell, "y"), Some("3")),
        other => panic!("unexpected packet {:?}", other.kind()),
    }
    let cells = &service.project().cells;
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].id(), y_id);
    assert_eq!(value(&cells[0], "y"), Some("x+1"));
}

#[tokio::test]
async fn snapshot_carries_the_whole_project() {
    let (service, _sink) = session(vec![Cell::note("a"), Cell::note("b")]);
    match service.snapshot() {
        Packet::ProjectSync { project, .. } => assert_eq!(&project, service.project()),
        other => panic!("unexpected packet {:?}", other.kind()),
    }
}

#[tokio::test]
async fn every_packet_variant_survives_encode_and_decode() {
    let (service, _sink) = propagated(vec![
        Cell::equation("x=2"),
        Cell::folder("f", vec![Cell::equation("y=x+1"), Cell::note("n")]),
    ])
    .await;
    let project = service.project().clone();
    let folder = project.cells[1].id();
    let nested = project.cells[1].children().expect("folder children")[0].clone();

    let packets = vec![
        Packet::project_sync(project.clone()),
        Packet::cell_update(nested.clone()),
        Packet::cell_move(nested.id(), 0, 1),
        Packet::cell_create(Cell::note("top"), 0, None),
        Packet::cell_create(nested.clone(), 2, Some(folder)),
        Packet::cell_delete(project.cells[0].id(), None),
        Packet::cell_delete(nested.id(), Some(folder)),
    ];

    for packet in packets {
        let encoded = packet.encode().expect("encode packet");
        let decoded = Packet::decode(&encoded).expect("decode packet");
        assert_eq!(decoded, packet, "packet changed across the wire: {encoded}");
    }
}

#[tokio::test]
async fn update_of_unknown_cell_is_a_lookup_error() {
    let (mut service, _sink) = session(vec![Cell::equation("x=1")]);
    let seen = rejections(&mut service);
    let before = service.project().clone();

    let err = service
        .apply_packet(Packet::cell_update(Cell::equation("x=9")))
        .await
        .unwrap_err();

    assert!(matches!(err, PacketError::Lookup(_)));
    assert_eq!(err.code(), "lookup_error");
    assert_eq!(service.project(), &before);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn update_reusing_an_id_from_elsewhere_is_rejected() {
    let reused = Cell::equation("a=1");
    let folder = Cell::folder("f", Vec::new());
    let (mut service, _sink) = session(vec![reused.clone(), folder.clone()]);
    let before = service.project().clone();

    let mut replacement = folder.clone();
    replacement
        .children_mut()
        .expect("folder children")
        .push(reused.clone());
    let err = service
        .apply_packet(Packet::cell_update(replacement))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PacketError::Validation(TreeError::DuplicateCellId(reused.id()))
    );
    assert_eq!(service.project(), &before);
}

#[tokio::test]
async fn update_may_keep_ids_of_the_replaced_folder() {
    let child = Cell::note("kept");
    let folder = Cell::folder("f", vec![child.clone()]);
    let (mut service, _sink) = session(vec![folder.clone()]);

    let mut renamed = folder.clone();
    renamed.set_editable_text("renamed");
    service
        .apply_packet(Packet::cell_update(renamed))
        .await
        .expect("rename applies");

    let cells = &service.project().cells;
    assert_eq!(cells[0].editable_text(), "renamed");
    assert_eq!(cells[0].children().expect("folder children")[0].id(), child.id());
}

#[tokio::test]
async fn create_with_repeated_ids_inside_the_new_folder_is_rejected() {
    let (mut service, _sink) = session(vec![Cell::note("only")]);
    let twin = Cell::note("twin");
    let folder = Cell::folder("pair", vec![twin.clone(), twin.clone()]);

    let err = service
        .apply_packet(Packet::cell_create(folder, 1, None))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PacketError::Validation(TreeError::DuplicateCellId(twin.id()))
    );
    assert_eq!(service.project().cells.len(), 1);
}
