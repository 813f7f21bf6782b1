use crate::config::{CompositionConfig, GenerateConfig};
use crate::error::{ComposeError, ComposeResult};
use crate::labels::{to_normalized_box, update_class_registry, write_label, Rect};
use crate::scene::{combine, Background};
use crate::utils::files::{base_name, ensure_output_directories, get_image_files, get_sub_dirs};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Dataset generation parameters that do not come from the config file
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Config file; its directory becomes the dataset directory
    pub config_path: PathBuf,
    /// Overrides the `seed` of the config file
    pub seed: Option<u64>,
    /// Worker threads for sample composition
    pub threads: usize,
    pub show_progress: bool,
}

/// A sample that could not be produced
#[derive(Debug, Clone)]
pub struct SampleFailure {
    pub name: String,
    pub error: String,
}

/// Statistics for a generation run
#[derive(Debug, Default)]
pub struct GenerateStats {
    pub seed: u64,
    pub class_names: usize,
    pub skipped_groups: usize,
    pub planned_samples: usize,
    pub written_samples: usize,
    pub cancelled_samples: usize,
    pub failures: Vec<SampleFailure>,
}

/// One planned image/label pair
#[derive(Debug, Clone)]
struct SampleJob {
    name: String,
    class_id: u32,
    source1: PathBuf,
    source2: PathBuf,
    composition: CompositionConfig,
}

/// Directory containing the config file, `.` for a bare file name
fn dataset_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Generate the whole dataset described by the config file
///
/// Configuration problems abort before anything is written. Individual samples
/// that fail are recorded in the returned stats and the run goes on. Once
/// `cancel` is set, samples that have not started yet are skipped.
pub fn generate_dataset(
    options: &GenerateOptions,
    cancel: &AtomicBool,
) -> ComposeResult<GenerateStats> {
    let config = GenerateConfig::load(&options.config_path)?;
    let base_dir = dataset_dir(&options.config_path);

    let seed = options
        .seed
        .or(config.seed)
        .unwrap_or_else(|| rand::rng().random());
    info!(seed, "Generating dataset in {}", base_dir.display());
    let mut rng = StdRng::seed_from_u64(seed);

    let sub_dirs1 = get_sub_dirs(&base_dir.join(&config.dir_names[0]))?;
    let sub_dirs2 = get_sub_dirs(&base_dir.join(&config.dir_names[1]))?;
    info!(
        "Found {} x {} class directories",
        sub_dirs1.len(),
        sub_dirs2.len()
    );

    let (images_dir, labels_dir) = ensure_output_directories(&base_dir)?;
    let background = config.background(&base_dir);

    let mut stats = GenerateStats {
        seed,
        ..GenerateStats::default()
    };
    let mut names = Vec::new();
    let mut jobs = Vec::new();

    for (pair_index, (dir1, dir2)) in sub_dirs1
        .iter()
        .flat_map(|dir1| sub_dirs2.iter().map(move |dir2| (dir1, dir2)))
        .enumerate()
    {
        let class_id = config.index + pair_index as u32;
        let name = format!("{}-{}", base_name(dir1), base_name(dir2));
        names.push(name.clone());

        let planned = plan_group(&config, class_id, &name, dir1, dir2, &background, &mut rng);
        if planned.is_empty() {
            stats.skipped_groups += 1;
        }
        jobs.extend(planned);
    }

    stats.planned_samples = jobs.len();
    let outcome = run_jobs(&jobs, &images_dir, &labels_dir, options, cancel)?;
    stats.written_samples = outcome.written;
    stats.cancelled_samples = outcome.cancelled;
    stats.failures = outcome.failures;

    let registry = update_class_registry(&base_dir, &names, config.index as usize)?;
    stats.class_names = names.len();
    debug!(total = registry.names().len(), "class registry updated");

    info!("{} names have been created", names.len());
    Ok(stats)
}

/// Plan every sample of one directory pair
///
/// Parameters are drawn here, in a fixed order, so the output only depends on
/// the seed and not on how the samples are later scheduled.
fn plan_group(
    config: &GenerateConfig,
    class_id: u32,
    name: &str,
    dir1: &Path,
    dir2: &Path,
    background: &Background,
    rng: &mut StdRng,
) -> Vec<SampleJob> {
    let list = |dir: &Path| match get_image_files(dir) {
        Ok(files) => files,
        Err(e) => {
            warn!("Skipping unreadable directory: {}", e);
            Vec::new()
        }
    };

    let files1 = list(dir1);
    let files2 = list(dir2);
    if files1.is_empty() || files2.is_empty() {
        warn!("No source images for class {} ({}), skipping", class_id, name);
        return Vec::new();
    }

    let mut jobs = Vec::new();
    let mut count = 0u32;
    for source1 in &files1 {
        for source2 in &files2 {
            for _ in 0..config.repeated_times {
                let prefix = format!("{:04}{:04}", class_id, count);
                jobs.push(SampleJob {
                    name: format!("{}-{}", prefix, name),
                    class_id,
                    source1: source1.clone(),
                    source2: source2.clone(),
                    composition: config.sample_composition(background, rng),
                });
                count += 1;
            }
        }
    }

    info!("Planned {} samples for class {} ({})", jobs.len(), class_id, name);
    jobs
}

struct JobOutcome {
    written: usize,
    cancelled: usize,
    failures: Vec<SampleFailure>,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let progress_bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    progress_bar.set_style(style);
    progress_bar.set_message("Composing samples");
    progress_bar
}

/// Compose all samples on a dedicated rayon pool
fn run_jobs(
    jobs: &[SampleJob],
    images_dir: &Path,
    labels_dir: &Path,
    options: &GenerateOptions,
    cancel: &AtomicBool,
) -> ComposeResult<JobOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.max(1))
        .build()
        .map_err(|e| ComposeError::config(format!("failed to start worker pool: {e}")))?;

    let progress = progress_bar(jobs.len(), options.show_progress);
    let written = AtomicUsize::new(0);
    let cancelled = AtomicUsize::new(0);

    let failures: Vec<SampleFailure> = pool.install(|| {
        jobs.par_iter()
            .filter_map(|job| {
                if cancel.load(Ordering::Relaxed) {
                    cancelled.fetch_add(1, Ordering::Relaxed);
                    progress.inc(1);
                    return None;
                }

                let result = write_sample(job, images_dir, labels_dir);
                progress.inc(1);

                match result {
                    Ok(rect) => {
                        written.fetch_add(1, Ordering::Relaxed);
                        debug!(sample = %job.name, ?rect, "Save {}", job.name);
                        None
                    }
                    Err(e) => {
                        warn!("Failed to create {}: {}", job.name, e);
                        Some(SampleFailure {
                            name: job.name.clone(),
                            error: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    });

    progress.finish_with_message("Completed sample composition");

    Ok(JobOutcome {
        written: written.load(Ordering::Relaxed),
        cancelled: cancelled.load(Ordering::Relaxed),
        failures,
    })
}

/// Compose one sample and write its image and label
fn write_sample(job: &SampleJob, images_dir: &Path, labels_dir: &Path) -> ComposeResult<Rect> {
    let image_path = images_dir.join(format!("{}.png", job.name));
    let label_path = labels_dir.join(format!("{}.txt", job.name));

    let (_, rect) = combine(&image_path, &job.source1, &job.source2, &job.composition)?;
    let bbox = to_normalized_box(rect, job.composition.background_size);
    write_label(&label_path, job.class_id, bbox)?;

    Ok(rect)
}

/// Print generation statistics
pub fn print_generation_stats(stats: &GenerateStats) {
    println!("\nDataset generation statistics:");
    println!("  Seed: {}", stats.seed);
    println!("  Class names: {}", stats.class_names);
    println!("  Skipped groups: {}", stats.skipped_groups);
    println!("  Planned samples: {}", stats.planned_samples);
    println!("  Written samples: {}", stats.written_samples);

    if stats.cancelled_samples > 0 {
        println!("  Cancelled samples: {}", stats.cancelled_samples);
    }

    if !stats.failures.is_empty() {
        println!("\n  Failed samples: {}", stats.failures.len());
        for failure in &stats.failures {
            println!("    {}: {}", failure.name, failure.error);
        }
    }

    println!("\n{} names have been created.", stats.class_names);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_JSON;
    use crate::labels::{CLASSES_FILE, MANIFEST_FILE};
    use image::{Rgba, RgbaImage};
    use std::fs;

    /// fronts/{cat,dog} x backs/{red}, one 10x10 image per class directory
    fn dataset(config_json: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for (group, class, color) in [
            ("fronts", "cat", [200, 0, 0, 255]),
            ("fronts", "dog", [0, 200, 0, 255]),
            ("backs", "red", [0, 0, 200, 255]),
        ] {
            let class_dir = root.join(group).join(class);
            fs::create_dir_all(&class_dir).unwrap();
            RgbaImage::from_pixel(10, 10, Rgba(color))
                .save(class_dir.join("0001.png"))
                .unwrap();
            fs::write(class_dir.join("notes.txt"), b"ignored").unwrap();
        }

        fs::write(root.join("config.json"), config_json).unwrap();
        dir
    }

    fn options(dir: &Path) -> GenerateOptions {
        GenerateOptions {
            config_path: dir.join("config.json"),
            seed: Some(17),
            threads: 2,
            show_progress: false,
        }
    }

    fn read_dir_sorted(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn generates_images_labels_and_registry() {
        let dir = dataset(SAMPLE_JSON);
        let stats = generate_dataset(&options(dir.path()), &AtomicBool::new(false)).unwrap();

        assert_eq!(stats.class_names, 2);
        assert_eq!(stats.planned_samples, 4);
        assert_eq!(stats.written_samples, 4);
        assert!(stats.failures.is_empty());

        assert_eq!(
            read_dir_sorted(&dir.path().join("images")),
            vec![
                "00030000-cat-red.png",
                "00030001-cat-red.png",
                "00040000-dog-red.png",
                "00040001-dog-red.png",
            ]
        );

        // 10x10 above 10x10 with 15px padding at (100, 100) on 400x400
        let label = fs::read_to_string(dir.path().join("labels/00040001-dog-red.txt")).unwrap();
        assert_eq!(label, "4 0.2625 0.29375 0.025 0.0875");

        let classes = fs::read_to_string(dir.path().join(CLASSES_FILE)).unwrap();
        assert_eq!(classes, "\n\n\ncat-red\ndog-red");
        assert!(dir.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn same_seed_produces_same_dataset() {
        let json = SAMPLE_JSON
            .replace(r#""size-ranges": [10, 10]"#, r#""size-ranges": [5, 30]"#)
            .replace(r#""overlay-sizes": [100, 100]"#, r#""overlay-sizes": [0, 390]"#)
            .replace(r#""angles": [0]"#, r#""angles": [0, 30, 90]"#);

        let first = dataset(&json);
        let second = dataset(&json);
        let mut single_thread = options(second.path());
        single_thread.threads = 1;

        generate_dataset(&options(first.path()), &AtomicBool::new(false)).unwrap();
        generate_dataset(&single_thread, &AtomicBool::new(false)).unwrap();

        for name in read_dir_sorted(&first.path().join("labels")) {
            let a = fs::read_to_string(first.path().join("labels").join(&name)).unwrap();
            let b = fs::read_to_string(second.path().join("labels").join(&name)).unwrap();
            assert_eq!(a, b, "label {name} differs");
        }
    }

    #[test]
    fn horizontal_config_writes_nothing() {
        let json = SAMPLE_JSON.replace(
            r#""direction": "vertical""#,
            r#""direction": "horizontal""#,
        );
        let dir = dataset(&json);

        let err = generate_dataset(&options(dir.path()), &AtomicBool::new(false)).unwrap_err();

        assert!(matches!(err, ComposeError::Config(_)));
        assert!(!dir.path().join("images").exists());
        assert!(!dir.path().join("labels").exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn empty_class_directory_skips_group() {
        let dir = dataset(SAMPLE_JSON);
        fs::create_dir_all(dir.path().join("fronts").join("empty")).unwrap();

        let stats = generate_dataset(&options(dir.path()), &AtomicBool::new(false)).unwrap();

        assert_eq!(stats.class_names, 3);
        assert_eq!(stats.skipped_groups, 1);
        assert_eq!(stats.written_samples, 4);
    }

    #[test]
    fn broken_source_is_isolated() {
        let dir = dataset(SAMPLE_JSON);
        fs::write(dir.path().join("fronts/cat/0002.png"), b"not an image").unwrap();

        let stats = generate_dataset(&options(dir.path()), &AtomicBool::new(false)).unwrap();

        assert_eq!(stats.planned_samples, 6);
        assert_eq!(stats.written_samples, 4);
        assert_eq!(stats.failures.len(), 2);
        assert!(stats.failures.iter().all(|f| f.name.ends_with("cat-red")));
    }

    #[test]
    fn cancelled_run_skips_remaining_samples() {
        let dir = dataset(SAMPLE_JSON);
        let stats = generate_dataset(&options(dir.path()), &AtomicBool::new(true)).unwrap();

        assert_eq!(stats.written_samples, 0);
        assert_eq!(stats.cancelled_samples, 4);
        assert!(read_dir_sorted(&dir.path().join("images")).is_empty());
    }

    #[test]
    fn dataset_dir_of_bare_file_name_is_current_dir() {
        assert_eq!(dataset_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(dataset_dir(Path::new("out/config.json")), PathBuf::from("out"));
    }
}
