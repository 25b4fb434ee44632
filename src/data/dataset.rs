use anyhow::{anyhow, Context, Result};
use image::Rgb32FImage;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::data::transforms::Sample;

/// Salient-object dataset: parallel ordered lists of image and mask paths.
/// `label_paths` is either the same length as `image_paths` or empty
/// (image-only mode, no mask folder on disk).
#[derive(Debug, Clone)]
pub struct SalObjDataset {
    pub image_paths: Vec<PathBuf>,
    pub label_paths: Vec<PathBuf>,
}

impl SalObjDataset {
    /// Build the entry list from a CSV manifest with a named identifier
    /// column. Identifiers are joined with `data_root/img_folder`; if the
    /// mask folder exists and is non-empty the same identifiers are joined
    /// with `data_root/mask_folder`.
    pub fn from_manifest(
        data_root: &Path,
        csv_path: &Path,
        img_folder: &str,
        mask_folder: &str,
        name_field: &str,
    ) -> Result<Self> {
        let mut reader = csv::Reader::from_path(csv_path)
            .with_context(|| format!("failed to open manifest {}", csv_path.display()))?;

        let headers = reader.headers()?.clone();
        let column = headers
            .iter()
            .position(|h| h == name_field)
            .ok_or_else(|| anyhow!("manifest has no '{}' column", name_field))?;

        let mut names = Vec::new();
        for record in reader.records() {
            let record = record?;
            if let Some(name) = record.get(column) {
                names.push(name.to_string());
            }
        }

        let img_dir = data_root.join(img_folder);
        let image_paths: Vec<PathBuf> = names.iter().map(|n| img_dir.join(n)).collect();

        let mask_dir = data_root.join(mask_folder);
        let label_paths = if dir_has_entries(&mask_dir) {
            names.iter().map(|n| mask_dir.join(n)).collect()
        } else {
            log::warn!(
                "no mask files under {}, dataset is image-only",
                mask_dir.display()
            );
            Vec::new()
        };

        log::info!(
            "manifest {}: {} samples ({})",
            csv_path.display(),
            image_paths.len(),
            if label_paths.is_empty() {
                "image-only"
            } else {
                "with masks"
            }
        );

        Ok(Self {
            image_paths,
            label_paths,
        })
    }

    /// Build the entry list by scanning `data_root/img_folder` for .jpg and
    /// .png files and pairing each with a same-stem .jpg under
    /// `data_root/mask_folder`. Multi-dot filenames keep everything before
    /// the final extension segment as the stem.
    pub fn from_folders(data_root: &Path, img_folder: &str, mask_folder: &str) -> Result<Self> {
        let img_dir = data_root.join(img_folder);
        let mut jpg_paths = Vec::new();
        let mut png_paths = Vec::new();
        for entry in WalkDir::new(&img_dir).max_depth(1).into_iter().flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("jpg") => jpg_paths.push(path.to_path_buf()),
                Some(ext) if ext.eq_ignore_ascii_case("png") => png_paths.push(path.to_path_buf()),
                _ => {}
            }
        }
        jpg_paths.sort();
        png_paths.sort();

        let mut image_paths = jpg_paths;
        image_paths.append(&mut png_paths);
        if image_paths.is_empty() {
            return Err(anyhow!("no .jpg/.png images under {}", img_dir.display()));
        }

        let mask_dir = data_root.join(mask_folder);
        let mut label_paths = Vec::new();
        if dir_has_entries(&mask_dir) {
            for img_path in &image_paths {
                // file_stem strips only the final extension segment, so
                // "a.b.jpg" pairs on the stem "a.b".
                let stem = img_path
                    .file_stem()
                    .ok_or_else(|| anyhow!("unusable image path {}", img_path.display()))?;
                label_paths.push(mask_dir.join(format!("{}.jpg", stem.to_string_lossy())));
            }
        } else {
            log::warn!("there is no mask file in {}", mask_dir.display());
        }

        log::info!(
            "scanned {}: {} samples ({})",
            img_dir.display(),
            image_paths.len(),
            if label_paths.is_empty() {
                "image-only"
            } else {
                "with masks"
            }
        );

        Ok(Self {
            image_paths,
            label_paths,
        })
    }

    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    pub fn has_labels(&self) -> bool {
        !self.label_paths.is_empty()
    }

    /// Random-access fetch with the self-healing policy: a sample that
    /// fails to load is deleted from disk (best-effort, both files), the
    /// failure is logged, and the scan moves to the next index. Returns
    /// `None` once the scan runs past the last index; there is no
    /// wrap-around.
    pub fn fetch(&self, index: usize) -> Option<Sample> {
        let mut idx = index;
        while idx < self.len() {
            match self.load_pair(idx) {
                Ok(sample) => return Some(sample),
                Err(err) => {
                    log::warn!(
                        "dropping corrupt sample {} ({}): {err:#}",
                        idx,
                        self.image_paths[idx].display()
                    );
                    let _ = fs::remove_file(&self.image_paths[idx]);
                    if self.has_labels() {
                        let _ = fs::remove_file(&self.label_paths[idx]);
                    }
                    idx += 1;
                }
            }
        }
        None
    }

    fn load_pair(&self, index: usize) -> Result<Sample> {
        let image = decode_rgb(&self.image_paths[index])?;
        let label = if self.has_labels() {
            decode_rgb(&self.label_paths[index])?
        } else {
            // Image-only mode: keep the shared-shape invariant with an
            // all-zero label.
            Rgb32FImage::new(image.width(), image.height())
        };
        Ok(Sample {
            index,
            image,
            label,
        })
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Decode to 3-channel float pixels in [0, 1]. Images carrying an alpha
/// channel are composited over white.
pub fn decode_rgb(path: &Path) -> Result<Rgb32FImage> {
    let img = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    if img.color().has_alpha() {
        let rgba = img.to_rgba32f();
        let mut out = Rgb32FImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            out.put_pixel(
                x,
                y,
                image::Rgb([
                    r * a + (1.0 - a),
                    g * a + (1.0 - a),
                    b * a + (1.0 - a),
                ]),
            );
        }
        Ok(out)
    } else {
        Ok(img.to_rgb32f())
    }
}
