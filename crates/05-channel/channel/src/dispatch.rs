//! Operation-code table for channel calls.
//!
//! The table is filled once in [`Dispatcher::new`] and never mutated
//! afterwards, so the channel thread can consult it without locking.

use std::collections::HashMap;

use iface_abi::{CallArgs, CallResult, GroupUri, Opcode};
use log::trace;
use transport_codecs::RpcCodec;
use transport_fabric::{Codec, Encoded};

use crate::channel::ChannelCore;
use crate::error::{ChannelError, ChannelResult};

type Handler = Box<dyn Fn(&mut ChannelCore, CallArgs) -> ChannelResult<CallResult> + Send + Sync>;

#[track_caller]
fn group(raw: String) -> ChannelResult<GroupUri> {
    GroupUri::parse(raw).map_err(|err| ChannelError::invalid_group(err.0))
}

pub struct Dispatcher {
    handlers: HashMap<u16, Handler>,
    codec: RpcCodec,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::with_capacity(Opcode::ALL.len()),
            codec: RpcCodec,
        };

        table.on(Opcode::CreateSocket, |core, args| {
            let CallArgs::Empty = args else {
                return Err(ChannelError::argument_mismatch("create_socket"));
            };
            core.sockets.create(&core.registry).map(CallResult::Socket)
        });
        table.on(Opcode::DestroySocket, |core, args| {
            let CallArgs::Socket(socket) = args else {
                return Err(ChannelError::argument_mismatch("destroy_socket"));
            };
            core.sockets.destroy(socket, &mut core.registry)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::CreateStream, |core, args| {
            let CallArgs::SocketGroup { socket, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("create_stream"));
            };
            let group = group(raw)?;
            core.sockets
                .create_stream(socket, group)
                .map(CallResult::Stream)
        });
        table.on(Opcode::Join, |core, args| {
            let CallArgs::SocketGroup { socket, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("join"));
            };
            let group = group(raw)?;
            core.sockets.join(socket, &group, &mut core.registry)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::Leave, |core, args| {
            let CallArgs::SocketGroup { socket, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("leave"));
            };
            let group = group(raw)?;
            core.sockets.leave(socket, &group, &mut core.registry)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::SetTtl, |core, args| {
            let CallArgs::SocketTtl { socket, ttl } = args else {
                return Err(ChannelError::argument_mismatch("set_ttl"));
            };
            core.sockets.set_ttl(socket, ttl)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::ListInterfaces, |core, args| {
            let CallArgs::Socket(socket) = args else {
                return Err(ChannelError::argument_mismatch("list_interfaces"));
            };
            core.sockets
                .list_interfaces(socket)
                .map(CallResult::InterfaceIds)
        });
        table.on(Opcode::AttachInterface, |core, args| {
            let CallArgs::SocketInterface { socket, interface } = args else {
                return Err(ChannelError::argument_mismatch("attach_interface"));
            };
            core.sockets
                .attach_interface(socket, interface, &mut core.registry)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::DetachInterface, |core, args| {
            let CallArgs::SocketInterface { socket, interface } = args else {
                return Err(ChannelError::argument_mismatch("detach_interface"));
            };
            core.sockets
                .detach_interface(socket, interface, &mut core.registry)?;
            Ok(CallResult::Unit)
        });
        table.on(Opcode::SetInterfaces, |core, args| {
            let CallArgs::SocketInterfaces { socket, interfaces } = args else {
                return Err(ChannelError::argument_mismatch("set_interfaces"));
            };
            core.sockets
                .set_interfaces(socket, &interfaces, &mut core.registry)?;
            Ok(CallResult::Unit)
        });

        table.on(Opcode::GetInterfaces, |core, args| {
            let CallArgs::Empty = args else {
                return Err(ChannelError::argument_mismatch("get_interfaces"));
            };
            Ok(CallResult::Interfaces(
                core.registry.iter().map(|iface| iface.property()).collect(),
            ))
        });
        table.on(Opcode::GroupSet, |core, args| {
            let CallArgs::Interface(interface) = args else {
                return Err(ChannelError::argument_mismatch("group_set"));
            };
            Ok(CallResult::GroupSet(core.registry.get(interface)?.group_set()))
        });
        table.on(Opcode::NeighborSet, |core, args| {
            let CallArgs::Interface(interface) = args else {
                return Err(ChannelError::argument_mismatch("neighbor_set"));
            };
            Ok(CallResult::Groups(
                core.registry.get(interface)?.adapter().neighbors(),
            ))
        });
        table.on(Opcode::ChildrenSet, |core, args| {
            let CallArgs::InterfaceGroup { interface, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("children_set"));
            };
            let group = group(raw)?;
            Ok(CallResult::Groups(
                core.registry.get(interface)?.adapter().children(&group),
            ))
        });
        table.on(Opcode::ParentSet, |core, args| {
            let CallArgs::InterfaceGroup { interface, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("parent_set"));
            };
            let group = group(raw)?;
            Ok(CallResult::Groups(
                core.registry.get(interface)?.adapter().parents(&group),
            ))
        });
        table.on(Opcode::DesignatedHost, |core, args| {
            let CallArgs::InterfaceGroup { interface, group: raw } = args else {
                return Err(ChannelError::argument_mismatch("designated_host"));
            };
            let group = group(raw)?;
            Ok(CallResult::Flag(
                core.registry
                    .get(interface)?
                    .adapter()
                    .designated_host(&group),
            ))
        });
        table.on(Opcode::AtomicMsgSize, |core, args| {
            let CallArgs::Empty = args else {
                return Err(ChannelError::argument_mismatch("get_atomic_msg_size"));
            };
            Ok(CallResult::Size(core.registry.atomic_msg_size()))
        });

        table
    }

    fn on<F>(&mut self, opcode: Opcode, handler: F)
    where
        F: Fn(&mut ChannelCore, CallArgs) -> ChannelResult<CallResult> + Send + Sync + 'static,
    {
        self.handlers.insert(opcode.code(), Box::new(handler));
    }

    pub fn handles(&self, opcode: u16) -> bool {
        self.handlers.contains_key(&opcode)
    }

    /// Decodes `args` and runs the handler registered for `opcode`.
    pub fn invoke(
        &self,
        opcode: u16,
        core: &mut ChannelCore,
        args: &Encoded,
    ) -> ChannelResult<CallResult> {
        let Some(handler) = self.handlers.get(&opcode) else {
            return Err(ChannelError::unknown_opcode(opcode));
        };
        let args = self.codec.decode_args(args.envelope, &args.payload)?;
        trace!(
            "dispatch {}",
            Opcode::from_code(opcode).map_or("?", Opcode::name)
        );
        handler(core, args)
    }

    /// Encodes a handler outcome; errors travel as failed results.
    pub fn encode_outcome(&self, outcome: &ChannelResult<CallResult>) -> ChannelResult<Encoded> {
        let reply = match outcome {
            Ok(result) => self.codec.encode_reply(result)?,
            Err(err) => self
                .codec
                .encode_reply(&CallResult::Failed(err.to_failure()))?,
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_handler() {
        let dispatcher = Dispatcher::new();
        for opcode in Opcode::ALL {
            assert!(dispatcher.handles(opcode.code()), "{}", opcode.name());
        }
        assert!(!dispatcher.handles(0x0300));
    }
}
