#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adapters_void::{GENERATOR_GROUP, QUOTE};
use channel::{receive_buffer, spawn, CallError, Channel, ChannelConfig};
use iface_abi::{FailureKind, SocketId};

const WAIT: Duration = Duration::from_secs(2);

fn void_channel(budget_bytes: usize) -> Channel {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = ChannelConfig::from_toml_str("[technology.void]\n").expect("config");
    config.channel.budget_bytes = budget_bytes;
    Channel::builder(config).build().expect("channel")
}

#[test]
fn runner_serves_calls_until_stopped() {
    let running = spawn(void_channel(1 << 20)).expect("spawn");
    let handle = running.handle();

    let socket = handle.create_socket().wait_timeout(WAIT).expect("socket");
    handle
        .join(socket, "grp://alpha")
        .wait_timeout(WAIT)
        .expect("join");
    assert_eq!(
        handle.atomic_msg_size().wait_timeout(WAIT).expect("size"),
        8 * 1024
    );
    running.stop().expect("clean stop");

    assert!(handle.is_closed());
    assert!(matches!(handle.create_socket().wait(), Err(CallError::Closed)));
}

#[test]
fn fatal_error_ends_the_runner() {
    let running = spawn(void_channel(1 << 20)).expect("spawn");
    let handle = running.handle();

    let result = handle.destroy_socket(SocketId(99)).wait_timeout(WAIT);
    assert!(matches!(
        result,
        Err(CallError::Failed { kind: FailureKind::RequirementFailed, .. })
    ));
    let err = running.join().expect_err("fatal");
    assert!(format!("{err:#}").contains("unknown socket#99"), "{err:#}");
}

#[test]
fn void_generator_feeds_joined_sockets() {
    let running = spawn(void_channel(4 * QUOTE.len())).expect("spawn");
    let handle = running.handle();
    let socket = handle.create_socket().wait_timeout(WAIT).expect("socket");
    let (target, packets) = receive_buffer();
    handle
        .register_blocking_target(socket, target)
        .expect("target");
    handle
        .join(socket, GENERATOR_GROUP)
        .wait_timeout(WAIT)
        .expect("join");

    for _ in 0..3 {
        let packet = packets.recv_timeout(WAIT).expect("quote");
        assert_eq!(packet.source.as_str(), GENERATOR_GROUP);
        assert_eq!(&*packet.payload, QUOTE);
    }

    handle
        .leave(socket, GENERATOR_GROUP)
        .wait_timeout(WAIT)
        .expect("leave");
    running.stop().expect("stop");
}

#[test]
#[ignore]
fn slow_generator_flood_stays_within_budget() {
    let channel = void_channel(16 * QUOTE.len());
    let budget = Arc::clone(channel.admission().budget());
    let running = spawn(channel).expect("spawn");
    let handle = running.handle();
    let socket = handle.create_socket().wait_timeout(WAIT).expect("socket");
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    handle
        .register_async_callback(socket, move |_, len, _| {
            assert_eq!(len, QUOTE.len());
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .expect("callback");
    handle
        .join(socket, GENERATOR_GROUP)
        .wait_timeout(WAIT)
        .expect("join");

    for _ in 0..200 {
        assert!(budget.used() <= budget.capacity());
        std::thread::sleep(Duration::from_millis(5));
    }
    running.stop().expect("stop");
    assert!(seen.load(Ordering::Relaxed) > 0);
}
