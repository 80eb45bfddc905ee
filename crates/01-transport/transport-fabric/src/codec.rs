use transport::Envelope;

use crate::error::FabricResult;

/// Serialized payload plus the envelope that identifies its schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub envelope: Envelope,
    pub payload: Vec<u8>,
}

impl Encoded {
    pub fn new(envelope: Envelope, payload: Vec<u8>) -> Self {
        Self { envelope, payload }
    }
}

/// Converts call arguments and call results to and from their wire form.
pub trait Codec: Clone + Send + Sync + 'static {
    type Args: Send + 'static;
    type Reply: Send + 'static;

    fn encode_args(&self, args: &Self::Args) -> FabricResult<Encoded>;
    fn decode_args(&self, envelope: Envelope, payload: &[u8]) -> FabricResult<Self::Args>;
    fn encode_reply(&self, reply: &Self::Reply) -> FabricResult<Encoded>;
    fn decode_reply(&self, envelope: Envelope, payload: &[u8]) -> FabricResult<Self::Reply>;
}
