#![cfg(test)]

use channel::{Channel, ChannelConfig, FromCallResult, PendingCall};
use iface_abi::InterfaceId;
use mock::{AdapterCall, CallLog, RecordingFactory};
use transport_fabric::HostLoop;

fn settle<T: FromCallResult>(channel: &mut Channel, call: PendingCall<T>) -> T {
    channel.poll().expect("poll");
    call.wait().expect("call")
}

#[test]
fn void_adapter_send_reaches_the_transport() {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = CallLog::new();
    let config = ChannelConfig::from_toml_str("[technology.void]\n").expect("config");
    let mut channel = Channel::builder(config)
        .factory(RecordingFactory::void("void", log.clone()))
        .build()
        .expect("channel");
    let handle = channel.handle();

    let socket = settle(&mut channel, handle.create_socket());
    settle(&mut channel, handle.set_interfaces(socket, &[InterfaceId(1)]));
    settle(&mut channel, handle.join(socket, "grp://alpha"));
    let stream = settle(&mut channel, handle.create_stream(socket, "grp://alpha"));
    handle.send(socket, stream, b"hi").expect("send");
    channel.poll().expect("poll");

    assert_eq!(
        log.sends(),
        vec![AdapterCall::Send {
            iface: InterfaceId(1),
            group: "grp://alpha".into(),
            payload: b"hi".to_vec(),
            ttl: 1,
        }]
    );
    assert_eq!(log.joins(InterfaceId(1), "grp://alpha"), 1);
}

#[test]
fn toml_configuration_shapes_the_channel() {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = CallLog::new();
    let config = ChannelConfig::from_toml_str(
        r#"
        [channel]
        budget_bytes = 4096
        drain_batch = 2

        [technology.void]

        [technology.tunnel]
        local_port = 0
        "#,
    )
    .expect("config");
    let channel = Channel::builder(config)
        .factory(RecordingFactory::void("void", log.clone()))
        .factory(RecordingFactory::void("tunnel", log.clone()))
        .build()
        .expect("channel");
    assert_eq!(channel.admission().budget().capacity(), 4096);
    let handle = channel.handle();

    let calls: Vec<_> = (0..3).map(|_| handle.create_socket()).collect();
    let interfaces = handle.get_interfaces();
    let mut host = HostLoop::new();
    host.register(channel);
    assert_eq!(host.run_tick().expect("tick"), 2);
    assert_eq!(host.run_until_idle(4).expect("idle"), 2);

    let sockets: Vec<_> = calls
        .into_iter()
        .map(|call| call.wait().expect("socket"))
        .collect();
    assert_eq!(sockets.len(), 3);
    let properties = interfaces.wait().expect("interfaces");
    assert_eq!(
        properties.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![InterfaceId(1), InterfaceId(2)]
    );
    assert!(properties.iter().all(|p| p.address == "void://"));
}
