use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iface_abi::{
    AdmitOutcome, CallArgs, CallResult, FailureKind, GroupUri, InterfaceId, Opcode, SocketId,
    StreamId, TechOptions,
};
use mock::{AdapterCall, CallLog, FailingFactory, RecordingFactory};
use transport_fabric::HostLoop;

use crate::{
    receive_buffer, CallError, Channel, ChannelConfig, ChannelError, FromCallResult, PendingCall,
};

const ALPHA: &str = "grp://alpha";
const WAIT: Duration = Duration::from_secs(1);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recorded_with(log: &CallLog, config: ChannelConfig, names: &[&'static str]) -> Channel {
    init_logger();
    let mut config = config;
    for name in names {
        config = config.with_technology(*name, TechOptions::new());
    }
    let mut builder = Channel::builder(config);
    for name in names {
        builder = builder.factory(RecordingFactory::void(*name, log.clone()));
    }
    builder.build().expect("channel")
}

/// One recorded void interface per name, ids assigned in population order.
fn recorded(log: &CallLog, names: &[&'static str]) -> Channel {
    recorded_with(log, ChannelConfig::default(), names)
}

fn settle<T: FromCallResult>(channel: &mut Channel, call: PendingCall<T>) -> Result<T, CallError> {
    channel.poll().expect("poll");
    call.wait_timeout(WAIT)
}

fn alpha() -> GroupUri {
    GroupUri::parse(ALPHA).expect("group")
}

fn join_count(channel: &Channel, iface: InterfaceId) -> u32 {
    channel
        .core()
        .registry()
        .get(iface)
        .expect("iface")
        .join_count(&alpha())
}

fn socket(channel: &mut Channel) -> SocketId {
    let handle = channel.handle();
    settle(channel, handle.create_socket()).expect("create_socket")
}

#[test]
fn underlying_join_fires_once_per_transition() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let iface = InterfaceId(1);
    let (s1, s2) = (socket(&mut channel), socket(&mut channel));

    let first = handle.join(s1, ALPHA);
    let second = handle.join(s2, ALPHA);
    channel.poll().expect("poll");
    first.wait().expect("join s1");
    second.wait().expect("join s2");
    assert_eq!(log.joins(iface, ALPHA), 1);
    assert_eq!(
        settle(&mut channel, handle.group_set(iface)).expect("group_set"),
        vec![(alpha(), 2)]
    );

    settle(&mut channel, handle.leave(s1, ALPHA)).expect("leave s1");
    assert_eq!(log.leaves(iface, ALPHA), 0);
    settle(&mut channel, handle.leave(s2, ALPHA)).expect("leave s2");
    assert_eq!(log.leaves(iface, ALPHA), 1);
    assert!(settle(&mut channel, handle.group_set(iface))
        .expect("group_set")
        .is_empty());

    settle(&mut channel, handle.leave(s2, ALPHA)).expect("leave again is a no-op");
    assert_eq!(log.leaves(iface, ALPHA), 1);
}

#[test]
fn repeated_join_from_one_socket_is_idempotent() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join again");

    assert_eq!(channel.core().sockets().get(s1).expect("socket").groups().len(), 1);
    assert_eq!(join_count(&channel, InterfaceId(1)), 1);

    let s2 = socket(&mut channel);
    settle(&mut channel, handle.join(s2, ALPHA)).expect("second joiner");
    assert_eq!(join_count(&channel, InterfaceId(1)), 2);
    assert_eq!(log.joins(InterfaceId(1), ALPHA), 1);
}

#[test]
fn destroying_a_socket_leaves_its_groups() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["tunnel", "void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    settle(&mut channel, handle.join(s1, "grp://beta")).expect("join");
    settle(&mut channel, handle.destroy_socket(s1)).expect("destroy");

    for iface in [InterfaceId(1), InterfaceId(2)] {
        assert_eq!(log.leaves(iface, ALPHA), 1);
        assert_eq!(log.leaves(iface, "grp://beta"), 1);
    }
    assert!(channel.core().sockets().is_empty());
}

#[test]
fn attach_and_detach_follow_the_socket_groups() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["tunnel", "void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    assert_eq!(
        settle(&mut channel, handle.list_interfaces(s1)).expect("list"),
        vec![InterfaceId(1), InterfaceId(2)]
    );
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");

    settle(&mut channel, handle.detach_interface(s1, InterfaceId(2))).expect("detach");
    assert_eq!(log.leaves(InterfaceId(2), ALPHA), 1);
    assert_eq!(log.leaves(InterfaceId(1), ALPHA), 0);
    assert_eq!(
        settle(&mut channel, handle.list_interfaces(s1)).expect("list"),
        vec![InterfaceId(1)]
    );

    settle(&mut channel, handle.attach_interface(s1, InterfaceId(2))).expect("attach");
    assert_eq!(log.joins(InterfaceId(2), ALPHA), 2);
}

#[test]
fn set_interfaces_drops_unknown_ids() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);

    settle(
        &mut channel,
        handle.set_interfaces(s1, &[InterfaceId(1), InterfaceId(5)]),
    )
    .expect("set_interfaces");
    assert_eq!(
        settle(&mut channel, handle.list_interfaces(s1)).expect("list"),
        vec![InterfaceId(1)]
    );
}

#[test]
fn set_interfaces_rejoins_groups_on_the_new_set() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["tunnel", "void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.set_interfaces(s1, &[InterfaceId(1)])).expect("narrow");
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    assert_eq!(log.joins(InterfaceId(2), ALPHA), 0);

    settle(&mut channel, handle.set_interfaces(s1, &[InterfaceId(2)])).expect("swap");
    assert_eq!(log.leaves(InterfaceId(1), ALPHA), 1);
    assert_eq!(log.joins(InterfaceId(2), ALPHA), 1);
}

#[test]
fn empty_interface_set_is_a_precondition_violation() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    let call = handle.set_interfaces(s1, &[]);
    let err = channel.poll().expect_err("fatal");
    assert!(matches!(err, ChannelError::Precondition { .. }));
    assert!(matches!(
        call.wait(),
        Err(CallError::Failed { kind: FailureKind::RequirementFailed, .. })
    ));
}

#[test]
fn outbound_fans_out_at_the_socket_ttl() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["tunnel", "void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.set_ttl(s1, 7)).expect("ttl");
    let stream = settle(&mut channel, handle.create_stream(s1, ALPHA)).expect("stream");

    handle.send(s1, stream, b"payload").expect("send");
    assert_eq!(handle.send_budget().used(), 7);
    channel.poll().expect("poll");
    assert_eq!(handle.send_budget().used(), 0);

    let sends: Vec<(InterfaceId, u8)> = log
        .sends()
        .into_iter()
        .map(|call| match call {
            AdapterCall::Send { iface, group, payload, ttl } => {
                assert_eq!(group, ALPHA);
                assert_eq!(payload, b"payload");
                (iface, ttl)
            }
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(sends, vec![(InterfaceId(1), 7), (InterfaceId(2), 7)]);
}

#[test]
fn full_send_budget_would_block() {
    let log = CallLog::new();
    let mut config = ChannelConfig::default();
    config.channel.send_budget_bytes = 4;
    let mut channel = recorded_with(&log, config, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    let stream = settle(&mut channel, handle.create_stream(s1, ALPHA)).expect("stream");

    let err = handle.send(s1, stream, b"too long").expect_err("budget");
    assert!(matches!(err, ChannelError::WouldBlock { requested: 8, available: 4 }));
    handle.send(s1, stream, b"fits").expect("send");
    assert!(matches!(
        handle.send(s1, stream, b"x"),
        Err(ChannelError::WouldBlock { .. })
    ));
    channel.poll().expect("poll");
    handle.send(s1, stream, b"x").expect("budget released");
}

#[test]
fn send_on_unknown_stream_is_dropped_and_releases_budget() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);

    handle.send(s1, StreamId(42), b"lost").expect("queued");
    assert_eq!(handle.send_budget().used(), 4);
    assert_eq!(channel.poll().expect("not fatal"), 1);
    assert_eq!(handle.send_budget().used(), 0);
    assert!(log.sends().is_empty());

    let stream = settle(&mut channel, handle.create_stream(s1, ALPHA)).expect("still running");
    handle.send(s1, stream, b"kept").expect("send");
    channel.poll().expect("poll");
    assert_eq!(log.sends().len(), 1);
}

#[test]
fn delivery_modes_replace_each_other() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    handle
        .register_async_callback(s1, move |source, len, data| {
            assert_eq!(source.as_str(), ALPHA);
            assert_eq!(len, data.len());
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("callback");
    channel.poll().expect("poll");
    assert_eq!(channel.admission().admit(&alpha(), b"one"), AdmitOutcome::Accepted);
    channel.poll().expect("poll");
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);

    let (target, receiver) = receive_buffer();
    handle.register_blocking_target(s1, target).expect("target");
    channel.poll().expect("poll");
    channel.admission().admit(&alpha(), b"two");
    channel.poll().expect("poll");
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    let packet = receiver.try_recv().expect("blocking delivery");
    assert_eq!(&*packet.payload, b"two");
    assert_eq!(packet.source, alpha());

    let counter = Arc::clone(&callbacks);
    handle
        .register_async_callback(s1, move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("callback");
    channel.poll().expect("poll");
    channel.admission().admit(&alpha(), b"three");
    channel.poll().expect("poll");
    assert_eq!(callbacks.load(Ordering::SeqCst), 2);
    assert!(receiver.try_recv().is_none());
}

#[test]
fn unbound_socket_does_not_starve_other_subscribers() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let (s1, s2) = (socket(&mut channel), socket(&mut channel));
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    settle(&mut channel, handle.join(s2, ALPHA)).expect("join");
    let (target, receiver) = receive_buffer();
    handle.register_blocking_target(s2, target).expect("target");

    channel.admission().admit(&alpha(), b"hello");
    channel.admission().admit(&GroupUri::parse("grp://other").expect("group"), b"nobody");
    channel.poll().expect("poll");
    assert_eq!(receiver.try_recv().map(|p| p.payload.to_vec()), Some(b"hello".to_vec()));
    assert!(receiver.try_recv().is_none());
    assert_eq!(channel.admission().budget().used(), 0);
}

#[test]
fn inbound_budget_bounds_queued_bytes() {
    let log = CallLog::new();
    let mut config = ChannelConfig::default();
    config.channel.budget_bytes = 10;
    let mut channel = recorded_with(&log, config, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    let (target, receiver) = receive_buffer();
    handle.register_blocking_target(s1, target).expect("target");
    channel.poll().expect("poll");

    let outcomes: Vec<AdmitOutcome> = (0..4)
        .map(|i| channel.admission().admit(&alpha(), format!("pkt{i}").as_bytes()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            AdmitOutcome::Accepted,
            AdmitOutcome::Accepted,
            AdmitOutcome::Dropped,
            AdmitOutcome::Dropped
        ]
    );
    channel.poll().expect("poll");
    let delivered: Vec<Vec<u8>> = std::iter::from_fn(|| receiver.try_recv())
        .map(|p| p.payload.to_vec())
        .collect();
    assert_eq!(delivered, vec![b"pkt0".to_vec(), b"pkt1".to_vec()]);
    assert_eq!(channel.admission().admit(&alpha(), b"pkt4"), AdmitOutcome::Accepted);
}

#[test]
fn inbound_packets_arrive_in_admission_order() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    settle(&mut channel, handle.join(s1, ALPHA)).expect("join");
    let (target, receiver) = receive_buffer();
    handle.register_blocking_target(s1, target).expect("target");

    let inbound = log.inbound(InterfaceId(1)).expect("inbound handle");
    for payload in [b"P1", b"P2", b"P3"] {
        assert_eq!(inbound.deliver(&alpha(), payload), AdmitOutcome::Accepted);
    }
    while channel.step(1).expect("step") > 0 {}
    let order: Vec<Vec<u8>> = std::iter::from_fn(|| receiver.try_recv())
        .map(|p| p.payload.to_vec())
        .collect();
    assert_eq!(order, vec![b"P1".to_vec(), b"P2".to_vec(), b"P3".to_vec()]);
}

#[test]
fn unknown_opcode_is_fatal_and_answered() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let call = handle.call::<CallResult>(0x0300, CallArgs::Empty);
    let err = channel.poll().expect_err("fatal");
    assert!(err.is_fatal());
    assert!(matches!(err, ChannelError::UnknownOpcode { opcode: 0x0300, .. }));
    assert!(matches!(
        call.wait(),
        Err(CallError::Failed { kind: FailureKind::RequirementFailed, .. })
    ));
}

#[test]
fn unknown_socket_and_invalid_group_are_fatal() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();

    let call = handle.join(SocketId(42), ALPHA);
    let err = channel.poll().expect_err("unknown socket");
    assert!(matches!(err, ChannelError::UnknownSocket { socket: SocketId(42), .. }));
    assert!(call.wait().is_err());

    let s1 = socket(&mut channel);
    let call = handle.join(s1, "");
    let err = channel.poll().expect_err("invalid group");
    assert!(matches!(err, ChannelError::InvalidGroup { .. }));
    assert!(matches!(
        call.wait(),
        Err(CallError::Failed { kind: FailureKind::RequirementFailed, .. })
    ));
    assert_eq!(log.calls().iter().filter(|c| matches!(c, AdapterCall::Join { .. })).count(), 0);
}

#[test]
fn mismatched_result_type_surfaces_as_protocol_mismatch() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let call = handle.call::<SocketId>(Opcode::AtomicMsgSize.code(), CallArgs::Empty);
    assert!(matches!(
        settle(&mut channel, call),
        Err(CallError::ProtocolMismatch { expected: "socket id", found: "size" })
    ));
}

#[test]
fn notifications_discard_their_result() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let s1 = socket(&mut channel);
    handle
        .notify(
            Opcode::Join,
            CallArgs::SocketGroup {
                socket: s1,
                group: ALPHA.into(),
            },
        )
        .expect("notify");
    handle.acknowledge().expect("ack");
    assert_eq!(channel.poll().expect("poll"), 2);
    assert_eq!(log.joins(InterfaceId(1), ALPHA), 1);
}

#[test]
fn teardown_answers_pending_calls_with_closed() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let pending = handle.create_socket();
    channel.shutdown();

    assert!(matches!(pending.wait_timeout(WAIT), Err(CallError::Closed)));
    assert!(matches!(handle.create_socket().wait(), Err(CallError::Closed)));
    assert!(matches!(handle.acknowledge(), Err(ChannelError::Closed)));
    assert_eq!(log.calls(), vec![AdapterCall::Shutdown { iface: InterfaceId(1) }]);
    drop(channel);
    assert_eq!(log.calls().len(), 1);
}

#[test]
fn population_skips_failures_and_falls_back_to_ip() {
    init_logger();
    let log = CallLog::new();
    let config = ChannelConfig::default().with_technology("overlay", TechOptions::new());
    let channel = Channel::builder(config)
        .factory(FailingFactory::new("overlay"))
        .factory(RecordingFactory::void("ip", log.clone()))
        .build()
        .expect("channel");
    assert_eq!(channel.core().registry().len(), 1);
    let only = channel.core().registry().ids().next().expect("default interface");
    assert!(log.inbound(only).is_some());
}

#[test]
fn population_follows_technology_order() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void", "custom", "tunnel"]);
    let handle = channel.handle();
    let technologies: Vec<(InterfaceId, String)> = settle(&mut channel, handle.get_interfaces())
        .expect("get_interfaces")
        .into_iter()
        .map(|p| (p.id, p.technology))
        .collect();
    assert_eq!(technologies.len(), 3);
    assert_eq!(
        technologies.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![InterfaceId(1), InterfaceId(2), InterfaceId(3)]
    );
    assert!(log.inbound(InterfaceId(3)).is_some());
}

#[test]
fn atomic_message_size_is_the_smallest_adapter_limit() {
    init_logger();
    let log = CallLog::new();
    let config = ChannelConfig::default()
        .with_technology("void", TechOptions::new())
        .with_technology("tunnel", TechOptions::new());
    let mut channel = Channel::builder(config)
        .factory(RecordingFactory::void("void", log.clone()).with_max_message_size(4000))
        .factory(RecordingFactory::void("tunnel", log.clone()).with_max_message_size(1200))
        .build()
        .expect("channel");
    let handle = channel.handle();
    assert_eq!(settle(&mut channel, handle.atomic_msg_size()).expect("size"), 1200);
    assert!(!settle(&mut channel, handle.designated_host(InterfaceId(1), ALPHA)).expect("dh"));
    let neighbors = settle(&mut channel, handle.neighbor_set(InterfaceId(1))).expect("neighbors");
    assert!(neighbors.is_empty());
}

#[test]
fn host_loop_drives_the_channel() {
    let log = CallLog::new();
    let channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let first = handle.create_socket();
    let second = handle.create_socket();

    let mut host = HostLoop::new();
    host.register(channel);
    assert_eq!(host.run_until_idle(8).expect("host loop"), 2);
    assert_eq!(first.wait().expect("first"), SocketId(1));
    assert_eq!(second.wait().expect("second"), SocketId(2));
}

#[test]
fn pending_calls_can_be_polled() {
    let log = CallLog::new();
    let mut channel = recorded(&log, &["void"]);
    let handle = channel.handle();
    let call = handle.create_socket();
    let call = match call.try_take() {
        Ok(_) => panic!("answered before the channel ran"),
        Err(call) => call,
    };
    channel.poll().expect("poll");
    assert!(call.is_ready());
    assert!(matches!(call.try_take(), Ok(Ok(SocketId(1)))));
}
