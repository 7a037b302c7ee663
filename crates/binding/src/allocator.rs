//! Transient upload memory for ordinary (uniform) data.
//!
//! Allocations are bump-allocated out of pages. Pages are never freed while the allocator lives;
//! [`OrdinaryDataAllocator::reset`] rewinds to the first page once the GPU is done with them.
use crate::{config::BindingConfig, resource::NativeHandle, Error, Result};
use std::convert::Infallible;

pub trait UploadPage {
    fn buffer(&self) -> NativeHandle;
    fn size(&self) -> u64;
    fn write(&mut self, offset: u64, bytes: &[u8]);
}

pub trait UploadPages {
    type Page: UploadPage;
    type Error: std::error::Error + Send + Sync + 'static;
    fn create_page(&mut self, size: u64) -> Result<Self::Page, Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrdinaryAllocation {
    pub page: usize,
    pub buffer: NativeHandle,
    pub offset: u64,
    pub size: u64,
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub struct OrdinaryDataAllocator<P: UploadPages> {
    source: P,
    pages: Vec<P::Page>,
    current: Option<usize>,
    cursor: u64,
    alignment: u64,
    page_size: u64,
    max_page_size: u64,
}

impl<P: UploadPages> OrdinaryDataAllocator<P> {
    pub fn new(source: P, alignment: u64, config: &BindingConfig) -> Self {
        Self {
            source,
            pages: Vec::new(),
            current: None,
            cursor: 0,
            alignment: alignment.max(1),
            page_size: config.ordinary_page_size.max(1),
            max_page_size: config.max_ordinary_page_size,
        }
    }
    pub fn alignment(&self) -> u64 {
        self.alignment
    }
    pub fn pages(&self) -> &[P::Page] {
        &self.pages
    }
    pub fn source(&self) -> &P {
        &self.source
    }

    fn take(&mut self, page: usize, aligned: u64, size: u64) -> OrdinaryAllocation {
        let offset = self.cursor;
        self.cursor += aligned;
        OrdinaryAllocation {
            page,
            buffer: self.pages[page].buffer(),
            offset,
            size,
        }
    }

    pub fn allocate(&mut self, size: u64) -> Result<OrdinaryAllocation> {
        let aligned = align_up(size.max(1), self.alignment);
        if let Some(current) = self.current {
            if self.cursor + aligned <= self.pages[current].size() {
                return Ok(self.take(current, aligned, size));
            }
        }
        // Pages kept from before the last reset are reused when big enough.
        let mut next = self.current.map_or(0, |current| current + 1);
        while next < self.pages.len() && self.pages[next].size() < aligned {
            next += 1;
        }
        if next == self.pages.len() {
            let page_size = match self.pages.last() {
                Some(last) => (last.size() * 2).min(self.max_page_size),
                None => self.page_size,
            }
            .max(aligned);
            tracing::trace!(page_size, pages = self.pages.len() + 1, "new ordinary data page");
            let page = self
                .source
                .create_page(page_size)
                .map_err(Error::backend)?;
            self.pages.push(page);
        }
        self.current = Some(next);
        self.cursor = 0;
        Ok(self.take(next, aligned, size))
    }

    /// Writes `bytes` at `offset` inside `allocation`.
    pub fn write(
        &mut self,
        allocation: &OrdinaryAllocation,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()> {
        if offset + bytes.len() as u64 > allocation.size {
            return Err(Error::DataOutOfBounds {
                offset: offset as usize,
                len: bytes.len(),
                size: allocation.size as usize,
            });
        }
        self.pages[allocation.page].write(allocation.offset + offset, bytes);
        Ok(())
    }

    /// Rewinds to the first page. Earlier allocations must no longer be in use.
    pub fn reset(&mut self) {
        self.current = None;
        self.cursor = 0;
    }
}

/// Pages in host memory, for the flat register model's CPU path and for tests.
#[derive(Debug, Default)]
pub struct HostPages {
    next_handle: u64,
}

#[derive(Debug)]
pub struct HostPage {
    handle: NativeHandle,
    bytes: Vec<u8>,
}

impl HostPage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl UploadPage for HostPage {
    fn buffer(&self) -> NativeHandle {
        self.handle
    }
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
    fn write(&mut self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl UploadPages for HostPages {
    type Page = HostPage;
    type Error = Infallible;
    fn create_page(&mut self, size: u64) -> Result<HostPage, Infallible> {
        self.next_handle += 1;
        Ok(HostPage {
            handle: NativeHandle(self.next_handle),
            bytes: vec![0; size as usize],
        })
    }
}

impl OrdinaryDataAllocator<HostPages> {
    pub fn host(alignment: u64, config: &BindingConfig) -> Self {
        Self::new(HostPages::default(), alignment, config)
    }
    pub fn bytes(&self, allocation: &OrdinaryAllocation) -> &[u8] {
        let offset = allocation.offset as usize;
        &self.pages[allocation.page].bytes()[offset..offset + allocation.size as usize]
    }
}
