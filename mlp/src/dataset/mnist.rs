use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use ndarray::Array2;

use crate::dataset::{DataSet, DataSplits};
use crate::prelude::{MlpError, IMAGE_WIDTH, NUM_CLASSES};

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Number of training examples carved off into the validation partition.
const VALIDATION_SIZE: usize = 5_000;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// Loads the four canonical IDX files from `data_dir` and returns the
/// train / validation / test partitions (55_000 / 5_000 / 10_000 examples).
///
/// Each file may be present gzipped (`<name>.gz`) or raw. Pixel values are
/// scaled to `[0, 1]`, labels are one-hot encoded.
pub fn load_mnist(data_dir: &Path) -> Result<DataSplits> {
    let (train_images, train_labels) = read_labeled_pair(data_dir, TRAIN_IMAGES, TRAIN_LABELS)?;
    let (test_images, test_labels) = read_labeled_pair(data_dir, TEST_IMAGES, TEST_LABELS)?;

    if train_images.nrows() <= VALIDATION_SIZE {
        return Err(MlpError(format!(
            "training set too small: {} examples, need more than {}",
            train_images.nrows(),
            VALIDATION_SIZE
        )))?;
    }

    // validation comes off the front of the training set, training keeps the rest
    let validation = DataSet::new(
        train_images.slice(ndarray::s![..VALIDATION_SIZE, ..]).to_owned(),
        train_labels.slice(ndarray::s![..VALIDATION_SIZE, ..]).to_owned(),
    )?;
    let train = DataSet::new(
        train_images.slice(ndarray::s![VALIDATION_SIZE.., ..]).to_owned(),
        train_labels.slice(ndarray::s![VALIDATION_SIZE.., ..]).to_owned(),
    )?;
    let test = DataSet::new(test_images, test_labels)?;

    log::info!(
        "loaded dataset from '{}': train: {}, validation: {}, test: {}",
        data_dir.display(),
        train.len(),
        validation.len(),
        test.len()
    );

    Ok(DataSplits { train, validation, test })
}

fn read_labeled_pair(
    data_dir: &Path,
    image_name: &str,
    label_name: &str,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let images = read_idx(data_dir, image_name)?;
    let labels = read_idx(data_dir, label_name)?;

    if images.sizes.len() != 3 {
        return Err(MlpError(format!("'{}' is not an image file", image_name)))?;
    }
    let (count, rows, cols) = (images.sizes[0], images.sizes[1], images.sizes[2]);
    if rows * cols != IMAGE_WIDTH {
        return Err(MlpError(format!(
            "'{}' has geometry {}x{}, expected 28x28",
            image_name, rows, cols
        )))?;
    }
    if labels.sizes.len() != 1 || labels.sizes[0] != count {
        return Err(MlpError(format!(
            "'{}' holds {} labels for {} images",
            label_name,
            labels.sizes.first().copied().unwrap_or(0),
            count
        )))?;
    }
    if images.data.len() != count * IMAGE_WIDTH || labels.data.len() < count {
        return Err(MlpError(format!("truncated data in '{}' / '{}'", image_name, label_name)))?;
    }

    let pixels: Vec<f32> = images.data.iter().map(|&b| b as f32 / 255.0).collect();
    let image_matrix = Array2::from_shape_vec((count, IMAGE_WIDTH), pixels)?;

    let mut label_matrix = Array2::zeros((count, NUM_CLASSES));
    for (i, &label) in labels.data[..count].iter().enumerate() {
        if label as usize >= NUM_CLASSES {
            return Err(MlpError(format!("'{}' row {}: label {} out of range", label_name, i, label)))?;
        }
        label_matrix[[i, label as usize]] = 1.0;
    }

    Ok((image_matrix, label_matrix))
}

struct IdxFile {
    sizes: Vec<usize>,
    data: Vec<u8>,
}

/// Reads one IDX file, preferring the gzipped variant when both exist.
fn read_idx(
    data_dir: &Path,
    name: &str,
) -> Result<IdxFile> {
    let gz_path = data_dir.join(format!("{}.gz", name));
    let raw_path = data_dir.join(name);

    let contents = if gz_path.is_file() {
        read_gz(&gz_path)?
    } else if raw_path.is_file() {
        std::fs::read(&raw_path).with_context(|| format!("failed to read '{}'", raw_path.display()))?
    } else {
        return Err(MlpError(format!(
            "dataset file '{}' not found in '{}' (nor '{}.gz'); \
             place the four MNIST IDX files there",
            name,
            data_dir.display(),
            name
        )))?;
    };

    parse_idx(&contents).with_context(|| format!("failed to parse '{}'", name))
}

fn read_gz(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let mut decoder = GzDecoder::new(file);
    let mut contents = Vec::new();
    decoder
        .read_to_end(&mut contents)
        .with_context(|| format!("failed to decompress '{}'", path.display()))?;
    Ok(contents)
}

fn parse_idx(contents: &[u8]) -> Result<IdxFile> {
    let mut r = Cursor::new(contents);
    let magic = r.read_u32::<BigEndian>().context("missing magic number")?;
    let num_dims = match magic {
        LABEL_MAGIC => 1,
        IMAGE_MAGIC => 3,
        _ => return Err(MlpError(format!("invalid magic number {}", magic)))?,
    };
    let mut sizes = Vec::with_capacity(num_dims);
    for _ in 0..num_dims {
        sizes.push(r.read_u32::<BigEndian>().context("truncated header")? as usize);
    }
    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    Ok(IdxFile { sizes, data })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use byteorder::WriteBytesExt;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn write_images(
        path: &Path,
        pixels: &[u8],
        count: u32,
        gzip: bool,
    ) {
        let mut header = Vec::new();
        header.write_u32::<BigEndian>(IMAGE_MAGIC).unwrap();
        header.write_u32::<BigEndian>(count).unwrap();
        header.write_u32::<BigEndian>(28).unwrap();
        header.write_u32::<BigEndian>(28).unwrap();
        header.extend_from_slice(pixels);
        write_maybe_gz(path, &header, gzip);
    }

    fn write_labels(
        path: &Path,
        labels: &[u8],
        gzip: bool,
    ) {
        let mut header = Vec::new();
        header.write_u32::<BigEndian>(LABEL_MAGIC).unwrap();
        header.write_u32::<BigEndian>(labels.len() as u32).unwrap();
        header.extend_from_slice(labels);
        write_maybe_gz(path, &header, gzip);
    }

    fn write_maybe_gz(
        path: &Path,
        bytes: &[u8],
        gzip: bool,
    ) {
        if gzip {
            let file = File::create(path).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(bytes).unwrap();
            encoder.finish().unwrap();
        } else {
            std::fs::write(path, bytes).unwrap();
        }
    }

    /// Writes a tiny but structurally valid dataset: VALIDATION_SIZE + 8
    /// training examples and 4 test examples.
    fn write_fixture(dir: &Path, gzip: bool) {
        let train_count = (VALIDATION_SIZE + 8) as u32;
        let suffix = if gzip { ".gz" } else { "" };
        let train_pixels = vec![128u8; train_count as usize * IMAGE_WIDTH];
        let train_labels: Vec<u8> = (0..train_count).map(|i| (i % 10) as u8).collect();
        write_images(&dir.join(format!("{}{}", TRAIN_IMAGES, suffix)), &train_pixels, train_count, gzip);
        write_labels(&dir.join(format!("{}{}", TRAIN_LABELS, suffix)), &train_labels, gzip);

        let test_pixels = vec![255u8; 4 * IMAGE_WIDTH];
        write_images(&dir.join(format!("{}{}", TEST_IMAGES, suffix)), &test_pixels, 4, gzip);
        write_labels(&dir.join(format!("{}{}", TEST_LABELS, suffix)), &[0, 1, 2, 3], gzip);
    }

    #[test]
    fn test_load_mnist_from_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), true);

        let splits = load_mnist(dir.path()).unwrap();
        assert_eq!(splits.validation.len(), VALIDATION_SIZE);
        assert_eq!(splits.train.len(), 8);
        assert_eq!(splits.test.len(), 4);
        // 128/255, scaled
        let v = splits.train.images()[[0, 0]];
        assert!((v - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(splits.test.images()[[0, 0]], 1.0);
    }

    #[test]
    fn test_load_mnist_from_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), false);

        let splits = load_mnist(dir.path()).unwrap();
        assert_eq!(splits.train.len(), 8);
    }

    #[test]
    fn test_missing_files_produce_a_pointed_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_mnist(dir.path()).unwrap_err();
        assert!(err.to_string().contains(TRAIN_IMAGES));
    }

    #[test]
    fn test_invalid_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), true);
        std::fs::write(dir.path().join(TRAIN_IMAGES), [0u8; 16]).unwrap();
        std::fs::remove_file(dir.path().join(format!("{}.gz", TRAIN_IMAGES))).unwrap();

        assert!(load_mnist(dir.path()).is_err());
    }

    #[test]
    fn test_label_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), true);
        // three labels for four test images
        write_labels(&dir.path().join(format!("{}.gz", TEST_LABELS)), &[0, 1, 2], true);

        assert!(load_mnist(dir.path()).is_err());
    }
}
