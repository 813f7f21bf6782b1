//! Procedural colour fields used as synthetic backgrounds.

use rand::{Rng, RngCore};

/// Row-major grid of RGB colours, `grid[y][x]`
pub type ColorGrid = Vec<Vec<[u8; 3]>>;

/// Source of procedural textures for "complex" backgrounds
///
/// Implementations must be deterministic for a given random source so a seeded
/// run reproduces its backgrounds.
pub trait NoiseGenerator: Send + Sync {
    fn generate(&self, width: u32, height: u32, rng: &mut dyn RngCore) -> ColorGrid;
}

/// Smooth value noise: random colours on a coarse lattice, interpolated between
#[derive(Debug, Clone, Copy)]
pub struct ValueNoise {
    /// Upper bound for lattice cells along each axis
    pub max_cells: u32,
}

impl Default for ValueNoise {
    fn default() -> Self {
        Self { max_cells: 4 }
    }
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

impl NoiseGenerator for ValueNoise {
    fn generate(&self, width: u32, height: u32, rng: &mut dyn RngCore) -> ColorGrid {
        let cells_x = rng.random_range(1..=self.max_cells.max(1)) as usize;
        let cells_y = rng.random_range(1..=self.max_cells.max(1)) as usize;

        let lattice: Vec<Vec<[f32; 3]>> = (0..=cells_y)
            .map(|_| {
                (0..=cells_x)
                    .map(|_| {
                        [
                            rng.random_range(0.0..=255.0),
                            rng.random_range(0.0..=255.0),
                            rng.random_range(0.0..=255.0),
                        ]
                    })
                    .collect()
            })
            .collect();

        let span_x = width.saturating_sub(1).max(1) as f32;
        let span_y = height.saturating_sub(1).max(1) as f32;

        (0..height)
            .map(|y| {
                let fy = y as f32 / span_y * cells_y as f32;
                let cy = (fy.floor() as usize).min(cells_y - 1);
                let ty = smoothstep(fy - cy as f32);

                (0..width)
                    .map(|x| {
                        let fx = x as f32 / span_x * cells_x as f32;
                        let cx = (fx.floor() as usize).min(cells_x - 1);
                        let tx = smoothstep(fx - cx as f32);

                        let mut color = [0u8; 3];
                        for (channel, value) in color.iter_mut().enumerate() {
                            let top = lerp(
                                lattice[cy][cx][channel],
                                lattice[cy][cx + 1][channel],
                                tx,
                            );
                            let bottom = lerp(
                                lattice[cy + 1][cx][channel],
                                lattice[cy + 1][cx + 1][channel],
                                tx,
                            );
                            *value = lerp(top, bottom, ty).round().clamp(0.0, 255.0) as u8;
                        }
                        color
                    })
                    .collect()
            })
            .collect()
    }
}
