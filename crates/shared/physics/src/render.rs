//! Deterministic cart-pole observation renderer.
//!
//! The scene is laid out in a 600×400 world (y up, origin bottom-left) with the
//! same geometry the training observations used, then area-sampled down to the
//! target frame size.

use crate::cartpole::{PhysicalState, X_THRESHOLD};
use crate::frame::Frame;

const WHITE: [f32; 3] = [255.0, 255.0, 255.0];
const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const POLE: [f32; 3] = [202.0, 152.0, 101.0];
const AXLE: [f32; 3] = [129.0, 132.0, 203.0];

const POLE_WIDTH: f32 = 10.0;
const CART_WIDTH: f32 = 50.0;
const CART_HEIGHT: f32 = 30.0;
const TRACK_HALF_THICKNESS: f32 = 0.5;

/// Produces a pixel buffer from a physical state.
pub trait Renderer: Send + Sync {
    fn render_into(&self, state: &PhysicalState, frame: &mut Frame);

    fn render(&self, state: &PhysicalState, width: usize, height: usize) -> Frame {
        let mut frame = Frame::new(width, height);
        self.render_into(state, &mut frame);
        frame
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CartPoleRenderer {
    pub world_width: f32,
    pub world_height: f32,
    /// Half the pole length, in simulation units.
    pub pole_length: f32,
    /// Sub-samples per output pixel along each axis.
    pub supersample: usize,
}

impl Default for CartPoleRenderer {
    fn default() -> Self {
        Self {
            world_width: 600.0,
            world_height: 400.0,
            pole_length: 0.5,
            supersample: 4,
        }
    }
}

/// Scene geometry for one state, in world pixels.
struct Scene {
    cart_x: f32,
    cart_y: f32,
    anchor_x: f32,
    anchor_y: f32,
    pole_len: f32,
    cos_t: f32,
    sin_t: f32,
}

impl Scene {
    fn new(r: &CartPoleRenderer, state: &PhysicalState) -> Self {
        let scale = r.world_width / (X_THRESHOLD * 2.0);
        let cart_x = state.x * scale + r.world_width / 2.0;
        let cart_y = r.world_height / 2.0;
        let (sin_t, cos_t) = state.theta.sin_cos();
        Self {
            cart_x,
            cart_y,
            anchor_x: cart_x,
            anchor_y: cart_y + CART_HEIGHT / 4.0,
            pole_len: scale * (2.0 * r.pole_length),
            cos_t,
            sin_t,
        }
    }

    /// Colour at a world point; later layers win (track line is drawn last).
    fn shade(&self, px: f32, py: f32) -> [f32; 3] {
        if (py - self.cart_y).abs() <= TRACK_HALF_THICKNESS {
            return BLACK;
        }

        let dx = px - self.anchor_x;
        let dy = py - self.anchor_y;
        let half_pole = POLE_WIDTH / 2.0;
        if dx * dx + dy * dy <= half_pole * half_pole {
            return AXLE;
        }

        // The pole is drawn rotated by -theta; undo that to get local coordinates.
        let lx = dx * self.cos_t - dy * self.sin_t;
        let ly = dx * self.sin_t + dy * self.cos_t;
        if lx.abs() <= half_pole && ly >= -half_pole && ly <= self.pole_len - half_pole {
            return POLE;
        }

        if (px - self.cart_x).abs() <= CART_WIDTH / 2.0
            && (py - self.cart_y).abs() <= CART_HEIGHT / 2.0
        {
            return BLACK;
        }

        WHITE
    }
}

impl Renderer for CartPoleRenderer {
    fn render_into(&self, state: &PhysicalState, frame: &mut Frame) {
        let scene = Scene::new(self, state);
        let w = frame.width();
        let h = frame.height();
        if w == 0 || h == 0 {
            return;
        }

        let n = self.supersample.max(1);
        let cell_w = self.world_width / w as f32;
        let cell_h = self.world_height / h as f32;
        let inv = 1.0 / (n * n) as f32;

        for row in 0..h {
            for col in 0..w {
                let mut acc = [0.0f32; 3];
                for sy in 0..n {
                    // Frame rows run top-down; the world's y axis points up.
                    let canvas_y = (row as f32 + (sy as f32 + 0.5) / n as f32) * cell_h;
                    let py = self.world_height - canvas_y;
                    for sx in 0..n {
                        let px = (col as f32 + (sx as f32 + 0.5) / n as f32) * cell_w;
                        let c = scene.shade(px, py);
                        acc[0] += c[0];
                        acc[1] += c[1];
                        acc[2] += c[2];
                    }
                }
                frame.put_pixel(
                    col,
                    row,
                    [
                        (acc[0] * inv).round().clamp(0.0, 255.0) as u8,
                        (acc[1] * inv).round().clamp(0.0, 255.0) as u8,
                        (acc[2] * inv).round().clamp(0.0, 255.0) as u8,
                        255,
                    ],
                );
            }
        }
    }
}
