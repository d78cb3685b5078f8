//! Framing for chunk tasks crossing the process boundary.
//!
//! Every message is a `u32` little-endian payload length followed by a
//! `bincode` payload. Only these fields cross the boundary:
//!
//! | Frame | Fields |
//! |-------|--------|
//! | [`TaskFrame`] | index, chunk spec, buffer shape, flat pixels, steps |
//! | [`ResultFrame`] | index, processed shape + flat pixels, or an error message |
//!
//! Pixels are flat `f32` in row-major (height, width, channels) order.

use std::io::{self, Read, Write};

use ndarray::{Array3, ArrayView3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkSpec;
use crate::error::{PipelineError, Result};
use crate::pipeline::{FilterStep, Pipeline};
use crate::task::ChunkTask;

/// Upper bound on a single frame, guards against reading garbage lengths.
pub const MAX_FRAME_BYTES: usize = 1 << 30;

/// Flat pixel payload with its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub shape: [u32; 3],
    pub pixels: Vec<f32>,
}

impl ChunkPayload {
    /// Flatten a buffer. Fails if an axis does not fit in `u32`.
    pub fn from_array(buffer: ArrayView3<f32>) -> Result<Self> {
        let (h, w, c) = buffer.dim();
        let axis = |len: usize| {
            u32::try_from(len).map_err(|_| {
                PipelineError::ShapeMismatch(format!("axis of length {} does not fit a frame", len))
            })
        };
        Ok(Self {
            shape: [axis(h)?, axis(w)?, axis(c)?],
            pixels: buffer.iter().copied().collect(),
        })
    }

    pub fn into_array(self) -> Result<Array3<f32>> {
        let [h, w, c] = self.shape;
        let shape = (h as usize, w as usize, c as usize);
        Array3::from_shape_vec(shape, self.pixels).map_err(|e| {
            PipelineError::ShapeMismatch(format!("payload does not fit shape {:?}: {}", shape, e))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFrame {
    pub index: u32,
    pub spec: ChunkSpec,
    pub payload: ChunkPayload,
    pub steps: Vec<FilterStep>,
}

impl TaskFrame {
    pub fn from_task(task: &ChunkTask) -> Result<Self> {
        let index = u32::try_from(task.index)
            .map_err(|_| PipelineError::worker(task.index, "chunk index does not fit a frame"))?;
        Ok(Self {
            index,
            spec: task.spec,
            payload: ChunkPayload::from_array(task.buffer.view())?,
            steps: task.pipeline.steps().to_vec(),
        })
    }

    pub fn into_task(self) -> Result<ChunkTask> {
        Ok(ChunkTask {
            index: self.index as usize,
            buffer: self.payload.into_array()?,
            spec: self.spec,
            pipeline: Pipeline::new(self.steps),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    pub index: u32,
    pub outcome: std::result::Result<ChunkPayload, String>,
}

impl ResultFrame {
    pub fn new(index: u32, result: Result<Array3<f32>>) -> Self {
        Self {
            index,
            outcome: result
                .and_then(|buf| ChunkPayload::from_array(buf.view()))
                .map_err(|e| e.to_string()),
        }
    }
}

/// Serialize a frame payload, refusing anything over [`MAX_FRAME_BYTES`].
///
/// Nothing is written, so a refused frame leaves the stream usable.
pub fn encode_frame<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    encode_frame_within(value, MAX_FRAME_BYTES)
}

fn encode_frame_within<T: Serialize>(value: &T, limit: usize) -> io::Result<Vec<u8>> {
    let bytes = bincode::serialize(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if bytes.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit of {}", bytes.len(), limit),
        ));
    }
    Ok(bytes)
}

/// Write an encoded payload with its length prefix and flush.
pub fn write_encoded<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame length does not fit u32"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)?;
    writer.flush()
}

/// Write one length-prefixed frame and flush.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
    let bytes = encode_frame(value)?;
    write_encoded(writer, &bytes)
}

/// Read one frame. `Ok(None)` on a clean end of stream before the header.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit", len),
        ));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    bincode::deserialize(&bytes)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
