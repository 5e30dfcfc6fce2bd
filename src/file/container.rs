use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

use memmap2::{Mmap, MmapAsRawDesc, MmapMut};

use crate::{dex_err, error::DexError, Result};

use super::{ContainerDexFile, DexFile};

/// Name of the dex entry within a zip archive.
pub const CLASSES_DEX: &str = "classes.dex";

pub trait DexContainer<'a>: AsRef<[u8]> + Deref<Target = [u8]> + 'a {
    fn data(&'a self) -> &'a [u8] {
        self.as_ref()
    }

    fn file_size(&'a self) -> usize {
        self.data().len()
    }
}

impl<'a> DexContainer<'a> for Mmap {}

impl<'a> DexContainer<'a> for &'a [u8] {}

// ----------------------------------------------------------------------------
// InMemoryDexContainer
// ----------------------------------------------------------------------------
pub struct InMemoryDexContainer<'a>(&'a [u8]);

impl<'a> InMemoryDexContainer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(data)
    }
}

impl<'a> Deref for InMemoryDexContainer<'a> {
    type Target = [u8];
    fn deref(&self) -> &'a Self::Target {
        self.0
    }
}

impl<'a> AsRef<[u8]> for InMemoryDexContainer<'a> {
    fn as_ref(&self) -> &'a [u8] {
        self.0
    }
}

impl<'a> DexContainer<'a> for InMemoryDexContainer<'a> {}

// ----------------------------------------------------------------------------
// AlignedImage
// ----------------------------------------------------------------------------
/// Heap copy of an image with the 4-byte base alignment the raw records
/// require. Plain `Vec<u8>` allocations carry no alignment guarantee, so
/// decompressed archive entries are copied into word-sized storage.
#[derive(Default)]
pub struct AlignedImage {
    words: Vec<u64>,
    len: usize,
}

impl AlignedImage {
    pub fn new(data: &[u8]) -> Self {
        let mut words = vec![0u64; (data.len() + 7) / 8];
        for (word, chunk) in words.iter_mut().zip(data.chunks(8)) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_ne_bytes(buf);
        }
        Self {
            words,
            len: data.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the word buffer holds at least `len` initialized bytes and
        // u64 storage has no invalid byte patterns.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast(), self.len) }
    }
}

impl Deref for AlignedImage {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for AlignedImage {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<'a> DexContainer<'a> for AlignedImage {}

// ----------------------------------------------------------------------------
// ImageBuffer
// ----------------------------------------------------------------------------
pub enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Deref for Mapping {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        match self {
            Mapping::ReadOnly(mmap) => mmap.as_ref(),
            Mapping::ReadWrite(mmap) => mmap.as_ref(),
        }
    }
}

/// Backing storage of a [`DexFileContainer`]: a file mapping or an aligned
/// heap copy (archive entries).
pub enum ImageBuffer {
    Mapped(Mapping),
    Heap(AlignedImage),
}

impl Deref for ImageBuffer {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        match self {
            ImageBuffer::Mapped(mapping) => mapping,
            ImageBuffer::Heap(image) => image.as_bytes(),
        }
    }
}

impl AsRef<[u8]> for ImageBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl<'a> DexContainer<'a> for ImageBuffer {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePermissions {
    ReadOnly,
    ReadWrite,
}

// ----------------------------------------------------------------------------
// DexFileContainer
// ----------------------------------------------------------------------------
pub struct DexFileContainer {
    image: ImageBuffer,
    location: String,
    pub verify: bool,
    pub verify_checksum: bool,
}

impl DexFileContainer {
    pub fn new<T>(file: T) -> Result<Self>
    where
        T: MmapAsRawDesc,
    {
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self {
            image: ImageBuffer::Mapped(Mapping::ReadOnly(mmap)),
            verify: false,
            verify_checksum: false,
            location: "[anonymous]".to_string(),
        })
    }

    /// Maps the dex file at `path`. The stored location is `path` with
    /// `strip_prefix` removed from its front when present.
    pub fn open_path<P: AsRef<Path>>(path: P, strip_prefix: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            image: ImageBuffer::Mapped(Mapping::ReadOnly(mmap)),
            verify: false,
            verify_checksum: false,
            location: location_string(path, strip_prefix),
        })
    }

    /// Reads the `classes.dex` entry of a zip archive into an aligned heap
    /// buffer. The stored location is `<path>!classes.dex`.
    pub fn open_archive<P: AsRef<Path>>(path: P, strip_prefix: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut entry = archive.by_name(CLASSES_DEX)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(Self {
            image: ImageBuffer::Heap(AlignedImage::new(&data)),
            verify: false,
            verify_checksum: false,
            location: format!("{}!{}", location_string(path, strip_prefix), CLASSES_DEX),
        })
    }

    /// Copies `data` into an aligned heap buffer.
    pub fn from_bytes(data: &[u8], location: String) -> Self {
        Self {
            image: ImageBuffer::Heap(AlignedImage::new(data)),
            verify: false,
            verify_checksum: false,
            location,
        }
    }

    pub fn location(mut self, location: String) -> Self {
        self.location = location;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn verify_checksum(mut self, verify_checksum: bool) -> Self {
        self.verify_checksum = verify_checksum;
        self
    }

    pub fn open(&self) -> Result<ContainerDexFile<'_>> {
        DexFile::open(self)
    }

    pub fn get_location(&self) -> &str {
        &self.location
    }

    pub fn data(&self) -> &ImageBuffer {
        &self.image
    }

    /// Switches the page protection of a mapped image. Requires exclusive
    /// access, so no accessor may be borrowing the container. Heap-backed
    /// images have no page protection and are rejected.
    pub fn set_permissions(&mut self, permissions: PagePermissions) -> Result<()> {
        let image = std::mem::replace(&mut self.image, ImageBuffer::Heap(AlignedImage::default()));
        match image {
            ImageBuffer::Mapped(Mapping::ReadOnly(mmap)) => {
                self.image = ImageBuffer::Mapped(match permissions {
                    PagePermissions::ReadOnly => Mapping::ReadOnly(mmap),
                    PagePermissions::ReadWrite => Mapping::ReadWrite(mmap.make_mut()?),
                });
                Ok(())
            }
            ImageBuffer::Mapped(Mapping::ReadWrite(mmap)) => {
                self.image = ImageBuffer::Mapped(match permissions {
                    PagePermissions::ReadOnly => Mapping::ReadOnly(mmap.make_read_only()?),
                    PagePermissions::ReadWrite => Mapping::ReadWrite(mmap),
                });
                Ok(())
            }
            heap => {
                self.image = heap;
                dex_err!(
                    DexFileError,
                    "Cannot change page permissions of {:?}: image is not file-backed",
                    self.location
                )
            }
        }
    }
}

fn location_string(path: &Path, strip_prefix: Option<&str>) -> String {
    let location = path.to_string_lossy();
    match strip_prefix {
        Some(prefix) if location.starts_with(prefix) => location.as_ref()[prefix.len()..].to_string(),
        _ => location.into_owned(),
    }
}
