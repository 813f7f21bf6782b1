use crate::compose::Direction;
use crate::error::{ComposeError, ComposeResult};
use crate::scene::Background;
use crate::utils::images::{Resample, ScaleAxis};
use rand::Rng;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundType {
    /// Use the picture named by `background-image`
    Image,
    /// Synthesize a noise canvas per sample
    RandomImage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RandomBackground {
    #[default]
    Simple,
    Complex,
}

fn default_repeated_times() -> u32 {
    1
}

/// Generation settings read from the JSON config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GenerateConfig {
    /// Source roots relative to the config file, one subdirectory per class part
    pub dir_names: [String; 2],
    pub background_size: [u32; 2],
    pub background_type: BackgroundType,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub background_random_image: RandomBackground,
    #[serde(default)]
    pub scale_by: ScaleAxis,
    #[serde(default)]
    pub scale_keeping_ratio: bool,
    /// Reuse the first image's sampled size for the second one
    #[serde(default)]
    pub scale_simultaneously: bool,
    pub size_ranges: [u32; 2],
    pub padding_ranges: [u32; 2],
    pub alpha_ranges: [u32; 2],
    pub angles: Vec<f32>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(alias = "overlay-start")]
    pub overlay_sizes: [u32; 2],
    #[serde(default = "default_repeated_times")]
    pub repeated_times: u32,
    /// First class id of the sweep
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub resample: Resample,
}

/// Everything needed to compose one sample
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionConfig {
    pub background: Background,
    pub background_size: (u32, u32),
    pub image_sizes: [(u32, u32); 2],
    pub scale_by: ScaleAxis,
    pub scale_keeping_ratio: bool,
    pub padding: u32,
    /// Degrees, counter-clockwise
    pub angle: f32,
    pub direction: Direction,
    /// Percentage applied to the overlay alpha, 100 or more leaves it alone
    pub alpha: u32,
    pub overlay_start: (u32, u32),
    pub resample: Resample,
    /// Seeds the background noise of this sample
    pub noise_seed: u64,
}

fn check_range(name: &str, range: [u32; 2]) -> ComposeResult<()> {
    if range[0] > range[1] {
        return Err(ComposeError::config(format!(
            "{name} must be [min, max], got [{}, {}]",
            range[0], range[1]
        )));
    }
    Ok(())
}

impl GenerateConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> ComposeResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ComposeResult<()> {
        if self.direction == Direction::Horizontal {
            return Err(ComposeError::config(
                "direction \"horizontal\" is not supported, use \"vertical\"",
            ));
        }

        if self.background_size.contains(&0) {
            return Err(ComposeError::config("background-size must be non-zero"));
        }

        if self.background_type == BackgroundType::Image && self.background_image.is_none() {
            return Err(ComposeError::config(
                "background-type \"image\" requires background-image",
            ));
        }

        if self.angles.is_empty() {
            return Err(ComposeError::config("angles must not be empty"));
        }

        if self.angles.iter().any(|angle| !angle.is_finite()) {
            return Err(ComposeError::config("angles must be finite numbers"));
        }

        if self.size_ranges[0] == 0 {
            return Err(ComposeError::config("size-ranges must start at 1 or more"));
        }

        check_range("size-ranges", self.size_ranges)?;
        check_range("padding-ranges", self.padding_ranges)?;
        check_range("alpha-ranges", self.alpha_ranges)?;
        check_range("overlay-sizes", self.overlay_sizes)?;

        Ok(())
    }

    pub fn background_size(&self) -> (u32, u32) {
        (self.background_size[0], self.background_size[1])
    }

    /// Resolve the background source; image paths are relative to `base_dir`
    pub fn background(&self, base_dir: &Path) -> Background {
        match (self.background_type, &self.background_image) {
            (BackgroundType::Image, Some(image)) => Background::Image(base_dir.join(image)),
            (BackgroundType::Image, None) | (BackgroundType::RandomImage, _) => {
                match self.background_random_image {
                    RandomBackground::Simple => Background::SimpleNoise,
                    RandomBackground::Complex => Background::ComplexNoise,
                }
            }
        }
    }

    /// Draw the randomized parameters of one sample
    pub fn sample_composition(
        &self,
        background: &Background,
        rng: &mut impl Rng,
    ) -> CompositionConfig {
        let [size_min, size_max] = self.size_ranges;
        let size1 = (
            rng.random_range(size_min..=size_max),
            rng.random_range(size_min..=size_max),
        );
        let size2 = if self.scale_simultaneously {
            size1
        } else {
            (
                rng.random_range(size_min..=size_max),
                rng.random_range(size_min..=size_max),
            )
        };

        let padding = rng.random_range(self.padding_ranges[0]..=self.padding_ranges[1]);
        let alpha = rng.random_range(self.alpha_ranges[0]..=self.alpha_ranges[1]);
        let angle = self.angles[rng.random_range(0..self.angles.len())];

        let [start_min, start_max] = self.overlay_sizes;
        let overlay_start = (
            rng.random_range(start_min..=start_max),
            rng.random_range(start_min..=start_max),
        );

        CompositionConfig {
            background: background.clone(),
            background_size: self.background_size(),
            image_sizes: [size1, size2],
            scale_by: self.scale_by,
            scale_keeping_ratio: self.scale_keeping_ratio,
            padding,
            angle,
            direction: self.direction,
            alpha,
            overlay_start,
            resample: self.resample,
            noise_seed: rng.random(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Two 10x10 sources, 15px padding, no rotation, placed at (100, 200) on 400x400
    pub(crate) fn composition() -> CompositionConfig {
        CompositionConfig {
            background: Background::SimpleNoise,
            background_size: (400, 400),
            image_sizes: [(10, 10), (10, 10)],
            scale_by: ScaleAxis::Horizontal,
            scale_keeping_ratio: false,
            padding: 15,
            angle: 0.0,
            direction: Direction::Vertical,
            alpha: 100,
            overlay_start: (100, 200),
            resample: Resample::Nearest,
            noise_seed: 1,
        }
    }

    pub(crate) const SAMPLE_JSON: &str = r#"{
        "dir-names": ["fronts", "backs"],
        "background-size": [400, 400],
        "background-type": "random-image",
        "background-random-image": "complex",
        "scale-by": "vertical",
        "scale-keeping-ratio": true,
        "size-ranges": [10, 10],
        "padding-ranges": [15, 15],
        "alpha-ranges": [100, 100],
        "angles": [0],
        "direction": "vertical",
        "overlay-sizes": [100, 100],
        "repeated-times": 2,
        "index": 3
    }"#;

    #[test]
    fn parses_kebab_case_keys() {
        let config: GenerateConfig = serde_json::from_str(SAMPLE_JSON).unwrap();
        config.validate().unwrap();

        assert_eq!(config.dir_names, ["fronts".to_string(), "backs".to_string()]);
        assert_eq!(config.background_size(), (400, 400));
        assert_eq!(config.background_type, BackgroundType::RandomImage);
        assert_eq!(config.background_random_image, RandomBackground::Complex);
        assert_eq!(config.scale_by, ScaleAxis::Vertical);
        assert!(config.scale_keeping_ratio);
        assert!(!config.scale_simultaneously);
        assert_eq!(config.repeated_times, 2);
        assert_eq!(config.index, 3);
        assert_eq!(config.seed, None);
        assert_eq!(config.resample, Resample::Nearest);
        assert_eq!(config.background(Path::new("/data")), Background::ComplexNoise);
    }

    #[test]
    fn overlay_start_alias_is_accepted() {
        let json = SAMPLE_JSON.replace("overlay-sizes", "overlay-start");
        let config: GenerateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.overlay_sizes, [100, 100]);
    }

    #[test]
    fn horizontal_direction_fails_validation() {
        let json = SAMPLE_JSON.replace(
            r#""direction": "vertical""#,
            r#""direction": "horizontal""#,
        );
        let config: GenerateConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(config.validate(), Err(ComposeError::Config(_))));
    }

    #[test]
    fn inverted_ranges_fail_validation() {
        let json = SAMPLE_JSON.replace("[15, 15]", "[20, 5]");
        let config: GenerateConfig = serde_json::from_str(&json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("padding-ranges"));
    }

    #[test]
    fn image_background_needs_a_path() {
        let json = SAMPLE_JSON.replace(r#""random-image""#, r#""image""#);
        let config: GenerateConfig = serde_json::from_str(&json).unwrap();
        assert!(config.validate().is_err());

        let mut config = config;
        config.background_image = Some("bg.jpg".to_string());
        config.validate().unwrap();
        assert_eq!(
            config.background(Path::new("/data")),
            Background::Image(Path::new("/data").join("bg.jpg"))
        );
    }

    #[test]
    fn empty_angles_fail_validation() {
        let json = SAMPLE_JSON.replace("[0]", "[]");
        let config: GenerateConfig = serde_json::from_str(&json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GenerateConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ComposeError::Io { .. }));
    }

    #[test]
    fn samples_stay_within_ranges() {
        let mut config: GenerateConfig = serde_json::from_str(SAMPLE_JSON).unwrap();
        config.size_ranges = [5, 50];
        config.padding_ranges = [0, 9];
        config.alpha_ranges = [30, 100];
        config.angles = vec![-15.0, 0.0, 45.0];
        config.overlay_sizes = [0, 300];

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let sample = config.sample_composition(&Background::SimpleNoise, &mut rng);
            for (w, h) in sample.image_sizes {
                assert!((5..=50).contains(&w) && (5..=50).contains(&h));
            }
            assert!(sample.padding <= 9);
            assert!((30..=100).contains(&sample.alpha));
            assert!(config.angles.contains(&sample.angle));
            assert!(sample.overlay_start.0 <= 300 && sample.overlay_start.1 <= 300);
        }
    }

    #[test]
    fn scale_simultaneously_reuses_first_size() {
        let mut config: GenerateConfig = serde_json::from_str(SAMPLE_JSON).unwrap();
        config.size_ranges = [1, 1000];
        config.scale_simultaneously = true;

        let mut rng = StdRng::seed_from_u64(5);
        let sample = config.sample_composition(&Background::SimpleNoise, &mut rng);
        assert_eq!(sample.image_sizes[0], sample.image_sizes[1]);
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let config: GenerateConfig = serde_json::from_str(SAMPLE_JSON).unwrap();
        let background = Background::SimpleNoise;
        let a = config.sample_composition(&background, &mut StdRng::seed_from_u64(9));
        let b = config.sample_composition(&background, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
