//! Integration tests for key-value operations routed through a scripted transport.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use docstore_client::core::protocol::{
    common_flags, OpCode, ResponseStatus, FORMAT_JSON, VATTR_DOCUMENT_EXPIRY,
};
use docstore_client::{
    DocstoreError, GetOptions, LookupInOptions, LookupInSpec, MutateInOptions, MutateInSpec,
    SubDocErrorKind,
};

use common::{
    document_response, lookup_body, lookup_specs, mutation_specs, open_collection,
    partitioned_document, partitioned_json, response, ScriptedTransport, StaticFetcher,
    SERVER_A, SERVER_B, SERVER_C,
};

const AIRLINE: &str = r#"{"name":"Air Docstore","country":"US","callsign":"DOC","fleet":{"size":12}}"#;

fn fetcher_for(chain: &[i16]) -> Arc<StaticFetcher> {
    let fetcher = Arc::new(StaticFetcher::new());
    fetcher.serve(partitioned_document("travel", 1, &[SERVER_A, SERVER_B, SERVER_C], chain, 64));
    fetcher
}

#[derive(Debug, Deserialize, PartialEq)]
struct Airline {
    name: String,
    country: String,
}

#[tokio::test]
async fn test_plain_get_decodes_json_body() {
    let transport = Arc::new(ScriptedTransport::new(|_, request| {
        assert_eq!(request.opcode, OpCode::Get);
        Ok(document_response(OpCode::Get, 41, common_flags(FORMAT_JSON), AIRLINE.as_bytes()))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection.get("airline::10", GetOptions::new()).await.unwrap();

    assert_eq!(result.cas(), 41);
    assert!(!result.is_projected());
    let airline: Airline = result.content_as().unwrap();
    assert_eq!(airline.name, "Air Docstore");
    assert_eq!(transport.sent()[0].server, SERVER_A);
}

#[tokio::test]
async fn test_projected_get_sends_one_spec_per_path() {
    let transport = Arc::new(ScriptedTransport::new(|_, request| {
        assert_eq!(request.opcode, OpCode::SubMultiLookup);
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::Success,
            7,
            lookup_body(&[
                (ResponseStatus::Success, br#""Air Docstore""#),
                (ResponseStatus::Success, b"12"),
            ]),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection
        .get("airline::10", GetOptions::new().project(["name", "fleet.size"]))
        .await
        .unwrap();

    let sent = lookup_specs(&transport.sent()[0].value);
    let paths: Vec<_> = sent.iter().map(|(_, _, path)| path.as_str()).collect();
    assert_eq!(paths, vec!["name", "fleet.size"]);
    assert!(result.is_projected());
    assert_eq!(
        result.content_as::<Value>().unwrap(),
        json!({"name": "Air Docstore", "fleet": {"size": 12}})
    );
}

#[tokio::test]
async fn test_seventeen_projections_with_expiry_fetch_whole_document() {
    let paths: Vec<String> = (0..17).map(|i| format!("f{i}")).collect();
    let mut doc = serde_json::Map::new();
    for (i, path) in paths.iter().enumerate() {
        doc.insert(path.clone(), json!(i));
    }
    doc.insert("unrequested".into(), json!(true));
    let body = Value::Object(doc).to_string();

    let transport = Arc::new(ScriptedTransport::new(move |_, _| {
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::Success,
            9,
            lookup_body(&[
                (ResponseStatus::Success, b"1700000000"),
                (ResponseStatus::Success, body.as_bytes()),
            ]),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection
        .get("wide::1", GetOptions::new().project(paths.clone()).with_expiry(true))
        .await
        .unwrap();

    let sent = lookup_specs(&transport.sent()[0].value);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], (OpCode::SubGet.value(), 0x04, VATTR_DOCUMENT_EXPIRY.to_string()));
    assert_eq!(sent[1], (OpCode::Get.value(), 0x00, String::new()));

    assert_eq!(
        result.expiry_time(),
        Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    );
    let content: Value = result.content_as().unwrap();
    assert_eq!(content["f16"], json!(16));
    assert!(content.get("unrequested").is_none());
}

#[tokio::test]
async fn test_lookup_in_round_trip() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::MultiPathFailure,
            3,
            lookup_body(&[
                (ResponseStatus::Success, b"42"),
                (ResponseStatus::SubDoc(SubDocErrorKind::PathNotFound), b""),
            ]),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection
        .lookup_in(
            "doc::1",
            [LookupInSpec::get("a.b"), LookupInSpec::exists("c")],
            LookupInOptions::new(),
        )
        .await
        .unwrap();

    let sent = lookup_specs(&transport.sent()[0].value);
    assert_eq!(
        sent,
        vec![
            (OpCode::SubGet.value(), 0x00, "a.b".to_string()),
            (OpCode::SubExist.value(), 0x00, "c".to_string()),
        ]
    );
    assert_eq!(result.cas(), 3);
    assert_eq!(result.content_as::<i64>(0).unwrap(), 42);
    assert!(!result.exists(1).unwrap());
}

#[tokio::test]
async fn test_lookup_on_deleted_document_reads_xattrs() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::Success,
            9,
            lookup_body(&[(ResponseStatus::Success, br#""pending""#)]),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection
        .lookup_in(
            "doc::1",
            [LookupInSpec::get("txn.state")],
            LookupInOptions::new().access_deleted(true),
        )
        .await
        .unwrap();

    let request = &transport.sent()[0];
    assert_eq!(request.extras.as_ref(), &[0x04]);
    assert_eq!(
        lookup_specs(&request.value),
        vec![(OpCode::SubGet.value(), 0x04, "txn.state".to_string())]
    );
    assert_eq!(result.content_as::<String>(0).unwrap(), "pending");
}

#[tokio::test]
async fn test_lookup_of_missing_document_fails_whole_operation() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::KeyNotFound,
            0,
            Bytes::new(),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport).await;

    let err = collection
        .lookup_in("missing", [LookupInSpec::get("a")], LookupInOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocstoreError::DocumentNotFound(_)));
}

#[tokio::test]
async fn test_mutate_in_encodes_specs_and_reads_counter() {
    let transport = Arc::new(ScriptedTransport::new(|_, request| {
        assert_eq!(request.opcode, OpCode::SubMultiMutation);
        assert_eq!(request.cas, 77);
        let mut body = BytesMut::new();
        body.put_u8(1);
        body.put_u16(ResponseStatus::Success.value());
        body.put_u32(2);
        body.put_slice(b"15");
        Ok(response(OpCode::SubMultiMutation, ResponseStatus::Success, 78, body.freeze()))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection
        .mutate_in(
            "airline::10",
            [
                MutateInSpec::upsert("name", "Air Two").unwrap(),
                MutateInSpec::increment("fleet.size", 3).create_path(),
            ],
            MutateInOptions::new().cas(77),
        )
        .await
        .unwrap();

    let sent = mutation_specs(&transport.sent()[0].value);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, OpCode::SubDictUpsert.value());
    assert_eq!(sent[0].3, Bytes::from_static(br#""Air Two""#));
    assert_eq!(sent[1].0, OpCode::SubCounter.value());
    assert_eq!(sent[1].1, 0x01);
    assert_eq!(sent[1].3, Bytes::from_static(b"3"));

    assert_eq!(result.cas(), 78);
    assert_eq!(result.content_as::<i64>(1).unwrap(), 15);
}

#[tokio::test]
async fn test_mutate_in_path_failure_fails_whole_operation() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        let mut body = BytesMut::new();
        body.put_u8(1);
        body.put_u16(ResponseStatus::SubDoc(SubDocErrorKind::PathExists).value());
        Ok(response(OpCode::SubMultiMutation, ResponseStatus::MultiPathFailure, 0, body.freeze()))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport).await;

    let err = collection
        .mutate_in(
            "airline::10",
            [
                MutateInSpec::upsert("name", "Air Two").unwrap(),
                MutateInSpec::insert("callsign", "DOC").unwrap(),
            ],
            MutateInOptions::new(),
        )
        .await
        .unwrap_err();

    match err {
        DocstoreError::SubDocument { index, kind } => {
            assert_eq!(index, 1);
            assert_eq!(kind, SubDocErrorKind::PathExists);
        }
        other => panic!("expected a sub-document error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_my_partition_installs_attached_topology_and_retries() {
    let newer = partitioned_json("travel", 2, &[SERVER_A, SERVER_B, SERVER_C], &[1], 64);
    let transport = Arc::new(ScriptedTransport::new(move |server, _| {
        if server.address() == SERVER_A {
            Ok(response(
                OpCode::Get,
                ResponseStatus::NotMyVbucket,
                0,
                Bytes::from(newer.clone()),
            ))
        } else {
            Ok(document_response(OpCode::Get, 5, common_flags(FORMAT_JSON), AIRLINE.as_bytes()))
        }
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let result = collection.get("airline::10", GetOptions::new()).await.unwrap();

    assert_eq!(result.cas(), 5);
    let servers: Vec<_> = transport.sent().into_iter().map(|s| s.server).collect();
    assert_eq!(servers, vec![SERVER_A.to_string(), SERVER_B.to_string()]);
    assert_eq!(collection.bucket().revision(), 2);
}

#[tokio::test]
async fn test_not_my_partition_gives_up_after_max_retries() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        Ok(response(OpCode::Get, ResponseStatus::NotMyVbucket, 0, Bytes::new()))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let err = collection.get("airline::10", GetOptions::new()).await.unwrap_err();

    assert!(err.is_stale_topology());
    assert_eq!(transport.sent().len(), 4);
}

#[tokio::test]
async fn test_get_any_replica_returns_first_answer() {
    let transport = Arc::new(
        ScriptedTransport::new(|_, request| {
            Ok(document_response(
                request.opcode,
                1,
                common_flags(FORMAT_JSON),
                AIRLINE.as_bytes(),
            ))
        })
        .delay(SERVER_A, Duration::from_millis(500)),
    );
    let (_client, collection) =
        open_collection("travel", fetcher_for(&[0, 1]), transport.clone()).await;

    let result = collection.get_any_replica("airline::10").await.unwrap();

    assert!(result.is_replica());
    let airline: Airline = result.content_as().unwrap();
    assert_eq!(airline.country, "US");
    let opcodes: Vec<_> = transport.sent().iter().map(|s| s.opcode).collect();
    assert!(opcodes.contains(&OpCode::Get));
    assert!(opcodes.contains(&OpCode::ReplicaRead));
}

#[tokio::test]
async fn test_get_any_replica_surfaces_first_failure() {
    let transport = Arc::new(
        ScriptedTransport::new(|server, request| {
            if server.address() == SERVER_B {
                Ok(response(request.opcode, ResponseStatus::KeyNotFound, 0, Bytes::new()))
            } else {
                Ok(document_response(request.opcode, 1, common_flags(FORMAT_JSON), AIRLINE.as_bytes()))
            }
        })
        .delay(SERVER_A, Duration::from_millis(500)),
    );
    let (_client, collection) = open_collection("travel", fetcher_for(&[0, 1]), transport).await;

    let err = collection.get_any_replica("airline::10").await.unwrap_err();
    assert!(matches!(err, DocstoreError::DocumentNotFound(_)));
}

#[tokio::test]
async fn test_get_all_replicas_yields_every_copy() {
    let transport = Arc::new(ScriptedTransport::new(|_, request| {
        Ok(document_response(request.opcode, 1, common_flags(FORMAT_JSON), AIRLINE.as_bytes()))
    }));
    let (_client, collection) =
        open_collection("travel", fetcher_for(&[0, 1, 2]), transport).await;

    let results: Vec<_> = collection
        .get_all_replicas("airline::10")
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    let replicas = results
        .iter()
        .filter(|r| r.as_ref().unwrap().is_replica())
        .count();
    assert_eq!(replicas, 2);
}

#[tokio::test]
async fn test_replica_read_skips_unassigned_slots() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let transport = Arc::new(ScriptedTransport::new(move |_, request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(document_response(request.opcode, 1, common_flags(FORMAT_JSON), AIRLINE.as_bytes()))
    }));
    let (_client, collection) =
        open_collection("travel", fetcher_for(&[0, -1, 2]), transport).await;

    let results: Vec<_> = collection
        .get_all_replicas("airline::10")
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cloned_builder_is_independent() {
    let transport = Arc::new(ScriptedTransport::new(|_, _| {
        Ok(response(
            OpCode::SubMultiLookup,
            ResponseStatus::Success,
            1,
            lookup_body(&[(ResponseStatus::Success, b"1"), (ResponseStatus::Success, b"2")]),
        ))
    }));
    let (_client, collection) = open_collection("travel", fetcher_for(&[0]), transport.clone()).await;

    let builder = collection.lookup_in_builder("doc::1");
    builder.get("a").get("b");
    let clone = builder.clone();
    assert_eq!(builder, clone);

    clone.exists("c");
    assert_eq!(builder.count(), 2);
    assert_eq!(clone.count(), 3);
    assert_ne!(builder, clone);

    let result = builder.execute().await.unwrap();
    assert_eq!(result.content_as::<i64>(1).unwrap(), 2);
    assert_eq!(lookup_specs(&transport.sent()[0].value).len(), 2);
}
