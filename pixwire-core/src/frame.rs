use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PipelineError;
use crate::header::{FrameHeader, FrameKind};

/// One frame extracted from (or destined for) the byte stream.
///
/// The payload is a frozen slice of the accumulator it was split from, so
/// handing it to a decode worker does not copy it.
#[derive(Clone, PartialEq, Eq)]
pub struct WireFrame {
    header: FrameHeader,
    payload: Bytes,
}

impl WireFrame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Result<Self, PipelineError> {
        let payload = payload.into();
        let data_len = u32::try_from(payload.len()).map_err(|_| PipelineError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self {
            header: FrameHeader::new(kind, data_len),
            payload,
        })
    }

    pub(crate) fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn into_parts(self) -> (FrameHeader, Bytes) {
        (self.header, self.payload)
    }

    /// Header followed by payload, as sent on the wire.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.header.frame_len());
        out.put_slice(&self.header.encode());
        out.put_slice(&self.payload);
        out.freeze()
    }
}

impl Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFrame")
            .field("kind", &self.header.kind)
            .field("data_len", &self.header.data_len)
            .finish()
    }
}
