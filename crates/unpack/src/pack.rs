//! ZIP comic packing.
//!
//! A [`Packer`] turns a set of loose files into a ZIP comic archive on a
//! background thread. Image pages are stored uncompressed under generated,
//! zero-padded names so that the archive lists them in page order; any other
//! files keep their own names and are deflated.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A background ZIP packing job.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use cbx_unpack::Packer;
///
/// let pages = vec![PathBuf::from("p1.png"), PathBuf::from("p2.png")];
/// let mut packer = Packer::new(pages, Vec::new(), "comic.cbz", "comic");
/// packer.pack();
/// assert!(packer.wait());
/// ```
pub struct Packer {
    image_files: Vec<PathBuf>,
    other_files: Vec<PathBuf>,
    archive_path: PathBuf,
    base_name: String,
    worker: Option<JoinHandle<bool>>,
}

impl Packer {
    /// Creates a packing job.
    ///
    /// # Arguments
    ///
    /// * `image_files` - Page images, already in reading order
    /// * `other_files` - Extra files stored under their original names
    /// * `archive_path` - Where the archive is written
    /// * `base_name` - Stem used when generating page names
    pub fn new(
        image_files: Vec<PathBuf>,
        other_files: Vec<PathBuf>,
        archive_path: impl Into<PathBuf>,
        base_name: impl Into<String>,
    ) -> Self {
        Self {
            image_files,
            other_files,
            archive_path: archive_path.into(),
            base_name: base_name.into(),
            worker: None,
        }
    }

    /// Starts writing the archive on a background thread.
    ///
    /// Does nothing if the job is already running. On failure the partial
    /// archive is deleted so no truncated file is left behind.
    pub fn pack(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let images = self.image_files.clone();
        let others = self.other_files.clone();
        let archive = self.archive_path.clone();
        let base_name = self.base_name.clone();
        info!(
            archive = %archive.display(),
            images = images.len(),
            "packing archive"
        );

        self.worker = Some(thread::spawn(move || {
            match write_archive(&images, &others, &archive, &base_name) {
                Ok(()) => true,
                Err(error) => {
                    warn!(archive = %archive.display(), %error, "packing failed");
                    if let Err(error) = fs::remove_file(&archive) {
                        debug!(%error, "could not remove partial archive");
                    }
                    false
                }
            }
        }));
    }

    /// Waits for the job and reports whether the archive was written.
    ///
    /// Returns `false` if packing failed or [`Packer::pack`] was never
    /// called.
    pub fn wait(&mut self) -> bool {
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or(false),
            None => false,
        }
    }
}

fn write_archive(
    images: &[PathBuf],
    others: &[PathBuf],
    archive: &Path,
    base_name: &str,
) -> io::Result<()> {
    let mut writer = ZipWriter::new(fs::File::create(archive)?);
    // Pad page numbers to the width of the page count so the names sort
    // lexically in page order.
    let width = images.len().to_string().len();
    let mut used = HashSet::new();

    for (index, path) in images.iter().enumerate() {
        let extension = match path.extension() {
            Some(extension) => format!(".{}", extension.to_string_lossy()),
            None => String::new(),
        };
        let name = format!("{:0width$} - {}{}", index + 1, base_name, extension);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(name.as_str(), options).map_err(zip_error)?;
        io::copy(&mut fs::File::open(path)?, &mut writer)?;
        used.insert(name);
    }

    for path in others {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let mut name = file_name.to_string_lossy().into_owned();
        // Underscore-prefix until the name clears everything stored so far.
        while used.contains(&name) {
            name.insert(0, '_');
        }
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(name.as_str(), options).map_err(zip_error)?;
        io::copy(&mut fs::File::open(path)?, &mut writer)?;
        used.insert(name);
    }

    writer.finish().map_err(zip_error)?;
    Ok(())
}

fn zip_error(error: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error)
}
