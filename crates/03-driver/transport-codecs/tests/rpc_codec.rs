//! Wire-level checks for the RPC codec.

use iface_abi::{
    CallArgs, CallFailure, CallResult, FailureKind, GroupUri, InterfaceId, InterfaceProperty,
    SocketId,
};
use transport::schema::{SCHEMA_VERSION_V1, TAG_RPC_ARGS, TAG_RPC_RESULT};
use transport::Envelope;
use transport_codecs::RpcCodec;
use transport_fabric::{Codec, FabricError};

#[test]
fn args_carry_the_args_tag_and_unvalidated_group_text() {
    let codec = RpcCodec;
    let args = CallArgs::SocketGroup {
        socket: SocketId(4),
        group: String::new(),
    };
    let encoded = codec.encode_args(&args).expect("encode");
    assert_eq!(encoded.envelope, Envelope::new(TAG_RPC_ARGS, SCHEMA_VERSION_V1));
    let decoded = codec
        .decode_args(encoded.envelope, &encoded.payload)
        .expect("decode");
    assert_eq!(decoded, args);
}

#[test]
fn failures_survive_the_wire() {
    let codec = RpcCodec;
    let reply = CallResult::Failed(CallFailure::new(
        FailureKind::RequirementFailed,
        "unknown socket socket#9",
    ));
    let encoded = codec.encode_reply(&reply).expect("encode");
    assert_eq!(encoded.envelope.tag, TAG_RPC_RESULT);
    let decoded = codec
        .decode_reply(encoded.envelope, &encoded.payload)
        .expect("decode");
    assert_eq!(decoded, reply);
}

#[test]
fn interface_listing_keeps_discovery_triples() {
    let codec = RpcCodec;
    let reply = CallResult::Interfaces(vec![InterfaceProperty {
        id: InterfaceId(1),
        name: "void".into(),
        address: "void://".into(),
        technology: "void".into(),
    }]);
    let encoded = codec.encode_reply(&reply).expect("encode");
    let decoded = codec
        .decode_reply(encoded.envelope, &encoded.payload)
        .expect("decode");
    assert_eq!(decoded, reply);
}

#[test]
fn args_payload_is_rejected_as_a_reply() {
    let codec = RpcCodec;
    let encoded = codec.encode_args(&CallArgs::Empty).expect("encode");
    let err = codec
        .decode_reply(encoded.envelope, &encoded.payload)
        .unwrap_err();
    assert!(matches!(err, FabricError::Codec(msg) if msg.contains("unexpected envelope tag")));
}

#[test]
fn future_schema_version_is_rejected() {
    let codec = RpcCodec;
    let encoded = codec.encode_reply(&CallResult::Unit).expect("encode");
    let envelope = Envelope::new(TAG_RPC_RESULT, SCHEMA_VERSION_V1 + 1);
    let err = codec.decode_reply(envelope, &encoded.payload).unwrap_err();
    assert!(matches!(err, FabricError::Codec(msg) if msg.contains("schema version mismatch")));
}

#[test]
fn group_lists_decode_into_validated_uris() {
    let codec = RpcCodec;
    let group = GroupUri::parse("grp://alpha").expect("group");
    let reply = CallResult::GroupSet(vec![(group.clone(), 2)]);
    let encoded = codec.encode_reply(&reply).expect("encode");
    match codec
        .decode_reply(encoded.envelope, &encoded.payload)
        .expect("decode")
    {
        CallResult::GroupSet(entries) => assert_eq!(entries, vec![(group, 2)]),
        other => panic!("unexpected reply {other:?}"),
    }
}
