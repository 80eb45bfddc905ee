//! Dedicated-thread driver for a [`Channel`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::{error, info};

use crate::channel::Channel;
use crate::client::ChannelHandle;
use crate::error::ChannelResult;

const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Moves `channel` onto its own thread and polls it until stopped.
pub fn spawn(channel: Channel) -> anyhow::Result<RunningChannel> {
    let handle = channel.handle();
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let thread = std::thread::Builder::new()
        .name("channel".into())
        .spawn(move || run(channel, &thread_stop))
        .context("failed to spawn channel thread")?;
    Ok(RunningChannel {
        handle,
        stop,
        thread: Some(thread),
    })
}

fn run(mut channel: Channel, stop: &AtomicBool) -> ChannelResult<()> {
    while !stop.load(Ordering::Acquire) {
        match channel.poll() {
            Ok(0) => {
                channel.wait_for_work(IDLE_WAIT);
            }
            Ok(_) => {}
            Err(err) => {
                error!("channel stopped: {err}");
                return Err(err);
            }
        }
    }
    channel.shutdown();
    info!("channel thread finished");
    Ok(())
}

pub struct RunningChannel {
    handle: ChannelHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<ChannelResult<()>>>,
}

impl RunningChannel {
    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// `true` once the channel thread has exited, e.g. after a fatal error.
    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(true, |thread| thread.is_finished())
    }

    /// Requests cooperative teardown and waits for the thread.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.stop.store(true, Ordering::Release);
        self.join_thread()
    }

    /// Waits for the thread without requesting a stop; returns the fatal
    /// error that ended it, if any.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> anyhow::Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread
            .join()
            .map_err(|_| anyhow!("channel thread panicked"))?
            .context("channel terminated")
    }
}

impl Drop for RunningChannel {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Err(err) = self.join_thread() {
            error!("{err:#}");
        }
    }
}
