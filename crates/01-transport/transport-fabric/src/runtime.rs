use anyhow::Context;

/// Something a host loop can make progress on without blocking.
pub trait PollEngine: Send {
    /// Performs one bounded unit of work and reports how many items it handled.
    fn poll(&mut self) -> anyhow::Result<usize>;
    fn name(&self) -> &'static str;
}

/// Cooperative loop that round-robins registered engines.
#[derive(Default)]
pub struct HostLoop {
    engines: Vec<Box<dyn PollEngine>>,
}

impl HostLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E>(&mut self, engine: E)
    where
        E: PollEngine + 'static,
    {
        tracing::debug!(engine = engine.name(), "registered poll engine");
        self.engines.push(Box::new(engine));
    }

    /// Polls every engine once. The first engine error stops the tick.
    pub fn run_tick(&mut self) -> anyhow::Result<usize> {
        let mut work = 0;
        for engine in self.engines.iter_mut() {
            let name = engine.name();
            work += engine
                .poll()
                .with_context(|| format!("engine {name} failed"))?;
        }
        Ok(work)
    }

    /// Ticks until a tick reports no work or `max_ticks` ticks have run.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> anyhow::Result<usize> {
        let mut total = 0;
        for _ in 0..max_ticks {
            let work = self.run_tick()?;
            if work == 0 {
                break;
            }
            total += work;
        }
        tracing::trace!(total, "host loop idle");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(usize);

    impl PollEngine for Countdown {
        fn poll(&mut self) -> anyhow::Result<usize> {
            if self.0 == 0 {
                return Ok(0);
            }
            self.0 -= 1;
            Ok(1)
        }

        fn name(&self) -> &'static str {
            "countdown"
        }
    }

    struct Broken;

    impl PollEngine for Broken {
        fn poll(&mut self) -> anyhow::Result<usize> {
            anyhow::bail!("boom")
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn runs_until_every_engine_is_idle() {
        let mut host = HostLoop::new();
        host.register(Countdown(3));
        host.register(Countdown(5));
        assert_eq!(host.run_until_idle(100).expect("run"), 8);
        assert_eq!(host.run_tick().expect("tick"), 0);
    }

    #[test]
    fn engine_error_names_the_engine() {
        let mut host = HostLoop::new();
        host.register(Broken);
        let err = host.run_tick().unwrap_err();
        assert_eq!(err.to_string(), "engine broken failed");
    }
}
