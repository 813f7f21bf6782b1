use crate::error::{ComposeError, ComposeResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extensions accepted as source images, compared case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Create a directory (and parents) readable and writable by everyone
///
/// Failing to change permissions is only logged.
pub fn ensure_directory(path: &Path) -> ComposeResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| ComposeError::io(path, e))?;
        info!("Created directory: {}", path.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o777)) {
            warn!("Could not change permissions of {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// Create `images/` and `labels/` under the dataset directory
pub fn ensure_output_directories(dataset_dir: &Path) -> ComposeResult<(PathBuf, PathBuf)> {
    let images_dir = dataset_dir.join("images");
    let labels_dir = dataset_dir.join("labels");

    ensure_directory(&images_dir)?;
    ensure_directory(&labels_dir)?;

    Ok((images_dir, labels_dir))
}

/// Immediate subdirectories of `dir`, sorted by path
pub fn get_sub_dirs(dir: &Path) -> ComposeResult<Vec<PathBuf>> {
    let mut sub_dirs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ComposeError::io(dir, e))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if path.is_dir() {
                Some(path)
            } else {
                None
            }
        })
        .collect();

    sub_dirs.sort();
    Ok(sub_dirs)
}

/// Image files directly inside `dir`, sorted by path
pub fn get_image_files(dir: &Path) -> ComposeResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ComposeError::io(dir, e))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if path.is_file() && is_image_file(&path) {
                Some(path)
            } else {
                None
            }
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Check if a file is a source image based on its extension
pub fn is_image_file(path: &Path) -> bool {
    if let Some(extension) = path.extension() {
        let ext = extension.to_string_lossy().to_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str())
    } else {
        false
    }
}

/// Last path component as text, used to build class names
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_are_case_insensitive() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("b.jpeg")));
        assert!(is_image_file(Path::new("b.Png")));
        assert!(is_image_file(Path::new("b.webp")));
        assert!(!is_image_file(Path::new("b.gif")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn scans_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("zeta")).unwrap();
        fs::create_dir(root.join("alpha")).unwrap();
        fs::write(root.join("b.png"), b"").unwrap();
        fs::write(root.join("a.JPG"), b"").unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();

        let sub_dirs = get_sub_dirs(root).unwrap();
        assert_eq!(sub_dirs, vec![root.join("alpha"), root.join("zeta")]);

        let files = get_image_files(root).unwrap();
        assert_eq!(files, vec![root.join("a.JPG"), root.join("b.png")]);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = get_sub_dirs(Path::new("/nonexistent/source")).unwrap_err();
        assert!(matches!(err, ComposeError::Io { .. }));
    }

    #[test]
    fn output_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let (images, labels) = ensure_output_directories(&dir.path().join("out")).unwrap();
        assert!(images.is_dir());
        assert!(labels.is_dir());
        // second call is a no-op
        ensure_output_directories(&dir.path().join("out")).unwrap();
    }

    #[test]
    fn base_name_of_class_directory() {
        assert_eq!(base_name(Path::new("/data/fronts/cat")), "cat");
    }
}
