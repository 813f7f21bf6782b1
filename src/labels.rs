//! YOLO label files, the class registry and the dataset manifest.

use crate::error::{ComposeError, ComposeResult};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const CLASSES_FILE: &str = "labels/classes.txt";
pub const MANIFEST_FILE: &str = "data.yaml";

/// Pixel-space rectangle on the background canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Bounding box as centre and size, each relative to the canvas dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Convert a placement rectangle to the normalized centre format
///
/// No clamping happens here, placement already keeps the rectangle on canvas.
pub fn to_normalized_box(rect: Rect, canvas: (u32, u32)) -> YoloBox {
    let (canvas_width, canvas_height) = (f64::from(canvas.0), f64::from(canvas.1));

    YoloBox {
        center_x: (2.0 * f64::from(rect.left) + f64::from(rect.width)) / (2.0 * canvas_width),
        center_y: (2.0 * f64::from(rect.top) + f64::from(rect.height)) / (2.0 * canvas_height),
        width: f64::from(rect.width) / canvas_width,
        height: f64::from(rect.height) / canvas_height,
    }
}

/// One line of a YOLO label file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabel {
    pub class_id: u32,
    pub bbox: YoloBox,
}

impl fmt::Display for YoloLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.class_id,
            self.bbox.center_x,
            self.bbox.center_y,
            self.bbox.width,
            self.bbox.height
        )
    }
}

/// Write a single-box label file, replacing any previous content
pub fn write_label(path: &Path, class_id: u32, bbox: YoloBox) -> ComposeResult<()> {
    let label = YoloLabel { class_id, bbox };
    fs::write(path, label.to_string()).map_err(|e| ComposeError::io(path, e))
}

/// Ordered class names, index == class id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRegistry {
    names: Vec<String>,
}

/// Contents of `data.yaml`
#[derive(Debug, Serialize)]
pub struct DatasetManifest {
    pub path: String,
    pub train: String,
    pub val: String,
    pub names: Vec<String>,
}

impl ClassRegistry {
    /// Read a newline separated class list, empty when the file does not exist
    pub fn load(path: &Path) -> ComposeResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
        if content.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self {
            names: content.split('\n').map(str::to_string).collect(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Place `new_names` at `start` onwards
    ///
    /// Slots already present are overwritten, missing slots are appended and any
    /// gap before `start` is filled with empty names.
    pub fn update(&mut self, new_names: &[String], start: usize) {
        let end = start + new_names.len();
        if self.names.len() < end {
            self.names.resize(end, String::new());
        }
        self.names[start..end].clone_from_slice(new_names);
    }

    pub fn manifest(&self, dataset_dir: &Path) -> DatasetManifest {
        DatasetManifest {
            path: dataset_dir.display().to_string(),
            train: "images".to_string(),
            val: "images".to_string(),
            names: self.names.clone(),
        }
    }

    /// Rewrite `labels/classes.txt` and `data.yaml` under `dataset_dir`
    pub fn save(&self, dataset_dir: &Path) -> ComposeResult<()> {
        let classes_path = dataset_dir.join(CLASSES_FILE);
        fs::write(&classes_path, self.names.join("\n"))
            .map_err(|e| ComposeError::io(&classes_path, e))?;

        let manifest_path = dataset_dir.join(MANIFEST_FILE);
        let yaml = serde_yaml::to_string(&self.manifest(dataset_dir))?;
        fs::write(&manifest_path, yaml).map_err(|e| ComposeError::io(&manifest_path, e))?;

        debug!(
            classes = self.names.len(),
            path = %classes_path.display(),
            "class registry written"
        );
        Ok(())
    }
}

/// Merge `new_names` into the registry stored under `dataset_dir`
///
/// Read-modify-write of the whole file: callers must not run two updates
/// against the same directory at once. An empty name list leaves the files alone.
pub fn update_class_registry(
    dataset_dir: &Path,
    new_names: &[String],
    start: usize,
) -> ComposeResult<ClassRegistry> {
    let mut registry = ClassRegistry::load(&dataset_dir.join(CLASSES_FILE))?;
    if new_names.is_empty() {
        info!("No class names to register");
        return Ok(registry);
    }

    registry.update(new_names, start);
    registry.save(dataset_dir)?;
    Ok(registry)
}
