#![cfg(test)]

//! Two channels, each with its own overlay instance, joined by an
//! in-process bus standing in for the overlay network.

use std::sync::Arc;
use std::time::Duration;

use channel::{receive_buffer, Channel, ChannelConfig, FromCallResult, PendingCall};
use iface_abi::{GroupUri, InterfaceId};
use mock::OverlayBus;

fn overlay_channel(bus: &Arc<OverlayBus>, port: u16) -> Channel {
    let config = ChannelConfig::default().with_technology("overlay", OverlayBus::options(port));
    Channel::builder(config)
        .factory(bus.factory())
        .build()
        .expect("channel")
}

fn settle<T: FromCallResult>(channel: &mut Channel, call: PendingCall<T>) -> T {
    channel.poll().expect("poll");
    call.wait().expect("call")
}

#[test]
fn overlay_instances_carry_traffic_between_channels() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bus = OverlayBus::new();
    let mut receiver_side = overlay_channel(&bus, 6001);
    let mut sender_side = overlay_channel(&bus, 6002);
    let rx = receiver_side.handle();
    let tx = sender_side.handle();

    let listener = settle(&mut receiver_side, rx.create_socket());
    settle(&mut receiver_side, rx.join(listener, "grp://alpha"));
    let (target, packets) = receive_buffer();
    rx.register_blocking_target(listener, target).expect("target");
    receiver_side.poll().expect("poll");

    let talker = settle(&mut sender_side, tx.create_socket());
    let stream = settle(&mut sender_side, tx.create_stream(talker, "grp://alpha"));
    tx.send(talker, stream, b"hello overlay").expect("send");
    sender_side.poll().expect("sender poll");
    receiver_side.poll().expect("receiver poll");

    let packet = packets
        .recv_timeout(Duration::from_secs(1))
        .expect("packet");
    assert_eq!(packet.source.as_str(), "grp://alpha");
    assert_eq!(&*packet.payload, b"hello overlay");

    let overlay = InterfaceId(1);
    assert!(settle(&mut receiver_side, rx.designated_host(overlay, "grp://alpha")));
    assert!(!settle(&mut sender_side, tx.designated_host(overlay, "grp://alpha")));
    let neighbors = settle(&mut sender_side, tx.neighbor_set(overlay));
    assert_eq!(neighbors, vec![GroupUri::parse("alm://127.0.0.1:6001").expect("uri")]);
    let interfaces = settle(&mut sender_side, tx.get_interfaces());
    assert_eq!(interfaces[0].address, "alm://127.0.0.1:6002");
    assert_eq!(interfaces[0].technology, "ALM");
}
