use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use crate::data::dataset::SalObjDataset;
use crate::data::transforms::{Compose, TensorSample, ToTensorLab};

/// One training batch in channel-first layout.
pub struct SalObjBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 4>,
    /// Dataset indices that actually landed in this batch (self-healing
    /// may have skipped some).
    pub indices: Vec<usize>,
    pub batch_size: usize,
}

/// Per-epoch batch iterator. Shuffles with its own seeded RNG, then either
/// walks the indices synchronously (`num_workers <= 1`) or fans them out to
/// worker threads that fetch + transform and feed a bounded prefetch
/// channel consumed here.
pub struct SalObjDataLoader<B: Backend> {
    batch_size: usize,
    num_samples: usize,
    device: B::Device,
    source: SampleSource,
}

enum SampleSource {
    Sync {
        dataset: Arc<SalObjDataset>,
        transform: Arc<Compose>,
        indices: Vec<usize>,
        cursor: usize,
        rng: StdRng,
    },
    Prefetch {
        receiver: Receiver<TensorSample>,
    },
}

impl<B: Backend> SalObjDataLoader<B> {
    pub fn new(
        dataset: Arc<SalObjDataset>,
        transform: Arc<Compose>,
        batch_size: usize,
        shuffle: bool,
        num_workers: usize,
        seed: Option<u64>,
        device: B::Device,
    ) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if shuffle {
            indices.shuffle(&mut rng);
        }
        let num_samples = indices.len();

        let source = if num_workers > 1 {
            // Bounded prefetch queue: workers block once the consumer falls
            // behind by two batches.
            let (sender, receiver) = mpsc::sync_channel(batch_size * 2);
            for shard in chunk_round_robin(&indices, num_workers) {
                let dataset = Arc::clone(&dataset);
                let transform = Arc::clone(&transform);
                let sender = sender.clone();
                let mut worker_rng = StdRng::seed_from_u64(rng.gen());
                thread::spawn(move || {
                    for idx in shard {
                        let Some(sample) = dataset.fetch(idx) else {
                            continue;
                        };
                        let sample = transform.apply(sample, &mut worker_rng);
                        let tensor = ToTensorLab.apply(sample);
                        if sender.send(tensor).is_err() {
                            // Consumer dropped the loader mid-epoch.
                            return;
                        }
                    }
                });
            }
            SampleSource::Prefetch { receiver }
        } else {
            SampleSource::Sync {
                dataset,
                transform,
                indices,
                cursor: 0,
                rng,
            }
        };

        Self {
            batch_size,
            num_samples,
            device,
            source,
        }
    }

    /// Number of batches this loader will yield at most.
    pub fn len(&self) -> usize {
        (self.num_samples + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    fn next_sample(&mut self) -> Option<TensorSample> {
        match &mut self.source {
            SampleSource::Sync {
                dataset,
                transform,
                indices,
                cursor,
                rng,
            } => loop {
                if *cursor >= indices.len() {
                    return None;
                }
                let idx = indices[*cursor];
                *cursor += 1;
                if let Some(sample) = dataset.fetch(idx) {
                    let sample = transform.apply(sample, rng);
                    return Some(ToTensorLab.apply(sample));
                }
            },
            SampleSource::Prefetch { receiver } => receiver.recv().ok(),
        }
    }
}

impl<B: Backend> Iterator for SalObjDataLoader<B> {
    type Item = SalObjBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.next_sample()?;
        let (height, width) = (head.height, head.width);
        let plane = (3 * height * width) as usize;

        let mut images = Vec::with_capacity(self.batch_size * plane);
        let mut labels = Vec::with_capacity(self.batch_size * plane);
        let mut indices = Vec::with_capacity(self.batch_size);

        images.extend_from_slice(&head.image);
        labels.extend_from_slice(&head.label);
        indices.push(head.index);

        while indices.len() < self.batch_size {
            let Some(sample) = self.next_sample() else {
                break;
            };
            if (sample.height, sample.width) != (height, width) {
                log::warn!(
                    "sample {} is {}x{}, batch is {}x{}; skipping",
                    sample.index,
                    sample.height,
                    sample.width,
                    height,
                    width
                );
                continue;
            }
            images.extend_from_slice(&sample.image);
            labels.extend_from_slice(&sample.label);
            indices.push(sample.index);
        }

        let batch_size = indices.len();
        let shape = [batch_size, 3, height as usize, width as usize];
        Some(SalObjBatch {
            images: Tensor::from_data(TensorData::new(images, shape), &self.device),
            labels: Tensor::from_data(TensorData::new(labels, shape), &self.device),
            indices,
            batch_size,
        })
    }
}

/// Half the machine, at least one: the loading side should leave cores for
/// the training process.
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

fn chunk_round_robin(indices: &[usize], num_workers: usize) -> Vec<Vec<usize>> {
    let mut shards = vec![Vec::new(); num_workers];
    for (i, &idx) in indices.iter().enumerate() {
        shards[i % num_workers].push(idx);
    }
    shards.retain(|s| !s.is_empty());
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transforms::RescaleT;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    type TestBackend = NdArray;

    fn seed_dataset(dir: &Path, count: usize) -> Arc<SalObjDataset> {
        let img_dir = dir.join("masked");
        let mask_dir = dir.join("original");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(10, 6, Rgb([i as u8 * 20, 0, 0]));
            img.save(img_dir.join(format!("img{i}.jpg"))).unwrap();
            let mask = RgbImage::from_pixel(10, 6, Rgb([255, 255, 255]));
            mask.save(mask_dir.join(format!("img{i}.jpg"))).unwrap();
        }
        Arc::new(SalObjDataset::from_folders(dir, "masked", "original").unwrap())
    }

    fn square_chain(size: u32) -> Arc<Compose> {
        Arc::new(Compose::new(vec![Box::new(RescaleT::new(size))]))
    }

    #[test]
    fn yields_full_then_partial_batches_in_order() {
        let root = tempfile::tempdir().unwrap();
        let dataset = seed_dataset(root.path(), 3);
        let loader = SalObjDataLoader::<TestBackend>::new(
            dataset,
            square_chain(8),
            2,
            false,
            1,
            Some(0),
            Default::default(),
        );
        assert_eq!(loader.len(), 2);

        let batches: Vec<_> = loader.collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].images.dims(), [2, 3, 8, 8]);
        assert_eq!(batches[0].labels.dims(), [2, 3, 8, 8]);
        assert_eq!(batches[0].indices, vec![0, 1]);
        assert_eq!(batches[1].images.dims(), [1, 3, 8, 8]);
        assert_eq!(batches[1].indices, vec![2]);
    }

    #[test]
    fn worker_prefetch_covers_every_sample() {
        let root = tempfile::tempdir().unwrap();
        let dataset = seed_dataset(root.path(), 5);
        let loader = SalObjDataLoader::<TestBackend>::new(
            dataset,
            square_chain(8),
            2,
            true,
            2,
            Some(11),
            Default::default(),
        );

        let mut seen: Vec<usize> = loader.flat_map(|b| b.indices).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shuffle_is_reproducible_under_fixed_seed() {
        let root = tempfile::tempdir().unwrap();
        let dataset = seed_dataset(root.path(), 5);
        let order = |seed| {
            SalObjDataLoader::<TestBackend>::new(
                Arc::clone(&dataset),
                square_chain(8),
                1,
                true,
                1,
                Some(seed),
                Default::default(),
            )
            .flat_map(|b| b.indices)
            .collect::<Vec<_>>()
        };
        assert_eq!(order(21), order(21));
    }
}
