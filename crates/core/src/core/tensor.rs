//! Tensor exchange: numeric buffers plus shapes, and pixel <-> planar conversion.
//!
//! Tensors are immutable once built. The buffer sits behind an `Arc`, so one
//! input can feed several evaluations (sync encodes the same image twice) without
//! copying and without anyone mutating it while an evaluation is in flight.

use std::sync::Arc;

use hashbrown::HashMap;
use wmscope_physics::Frame;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Arc<[f32]>,
    shape: Vec<usize>,
}

/// Named inputs or outputs of one evaluate call.
pub type NamedTensors = HashMap<String, Tensor>;

impl Tensor {
    pub fn new(data: impl Into<Arc<[f32]>>, shape: &[usize]) -> Result<Self, EngineError> {
        let data = data.into();
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(EngineError::ElementCount {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Self {
            data: vec![0.0; n].into(),
            shape: shape.to_vec(),
        }
    }

    /// `[1, n]` row vector.
    pub fn row(values: &[f32]) -> Self {
        Self {
            data: values.into(),
            shape: vec![1, values.len()],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Build a [`NamedTensors`] map from `(name, tensor)` pairs.
pub fn named<'a>(pairs: impl IntoIterator<Item = (&'a str, Tensor)>) -> NamedTensors {
    pairs
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect()
}

/// RGBA8 -> channel-major `[R plane, G plane, B plane]` in `[0, 1]`. Alpha is dropped.
pub fn image_to_planar(frame: &Frame) -> Vec<f32> {
    let plane = frame.pixel_count();
    let mut out = vec![0.0f32; 3 * plane];
    for (i, px) in frame.as_rgba().chunks_exact(4).enumerate() {
        out[i] = px[0] as f32 / 255.0;
        out[plane + i] = px[1] as f32 / 255.0;
        out[2 * plane + i] = px[2] as f32 / 255.0;
    }
    out
}

/// Channel-major floats -> RGBA8, written into `frame`.
///
/// Each value is clamped to `[0, 1]` before scaling and rounding; alpha is 255.
pub fn planar_to_image(planar: &[f32], frame: &mut Frame) -> Result<(), EngineError> {
    let plane = frame.pixel_count();
    if planar.len() != 3 * plane {
        return Err(EngineError::ElementCount {
            shape: vec![3, frame.height(), frame.width()],
            expected: 3 * plane,
            actual: planar.len(),
        });
    }

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    for (i, px) in frame.as_rgba_mut().chunks_exact_mut(4).enumerate() {
        px[0] = to_u8(planar[i]);
        px[1] = to_u8(planar[plane + i]);
        px[2] = to_u8(planar[2 * plane + i]);
        px[3] = 255;
    }
    Ok(())
}

/// Image tensor `[1, 3, H, W]` for an encoder input.
pub fn frame_to_tensor(frame: &Frame) -> Tensor {
    Tensor {
        data: image_to_planar(frame).into(),
        shape: vec![1, 3, frame.height(), frame.width()],
    }
}

/// Decoder output `[1, 3, H, W]` -> fresh frame.
pub fn tensor_to_frame(tensor: &Tensor, width: usize, height: usize) -> Result<Frame, EngineError> {
    let mut frame = Frame::new(width, height);
    planar_to_image(tensor.data(), &mut frame)?;
    Ok(frame)
}
