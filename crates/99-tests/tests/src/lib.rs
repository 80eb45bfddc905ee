//! Cross-crate scenarios for the multicast channel.

#[cfg(test)]
mod channel_e2e;

#[cfg(test)]
mod overlay_e2e;

#[cfg(test)]
mod runner_e2e;
