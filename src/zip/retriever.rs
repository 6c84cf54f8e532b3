//! Per-entry payload retrieval.
//!
//! For one entry this resolves the local-header body offset, fetches the
//! compressed payload as a set of concurrent ranged partitions, persists
//! it, and hands non-stored payloads to the codec registry for in-place
//! expansion. Entries share no mutable state, so a bounded worker pool
//! retrieves many of them concurrently.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::fetch::RangeFetch;

use super::codec::{CodecRegistry, expand_payload};
use super::cursor::ByteCursor;
use super::structures::{
    CompressionMethod, LOCAL_HEADER_LEN, LOCAL_HEADER_SIGNATURE, ZipEntry,
};

/// Number of ranged requests one entry's payload is split into.
pub const DEFAULT_PARTITIONS: usize = 5;

/// Default size of the entry worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Retrieves entry payloads through a [`RangeFetch`] source.
pub struct BodyRetriever<F: RangeFetch> {
    fetcher: Arc<F>,
    codecs: Arc<CodecRegistry>,
    partitions: usize,
    workers: usize,
    flatten: bool,
}

impl<F: RangeFetch> Clone for BodyRetriever<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            codecs: Arc::clone(&self.codecs),
            partitions: self.partitions,
            workers: self.workers,
            flatten: self.flatten,
        }
    }
}

impl<F: RangeFetch + 'static> BodyRetriever<F> {
    pub fn new(fetcher: Arc<F>, codecs: CodecRegistry) -> Self {
        Self {
            fetcher,
            codecs: Arc::new(codecs),
            partitions: DEFAULT_PARTITIONS,
            workers: DEFAULT_WORKERS,
            flatten: false,
        }
    }

    /// Set how many ranged requests each payload is split into.
    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// Set how many entries are retrieved concurrently.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Drop archive directory structure and keep only the last path
    /// segment of each entry name.
    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Fetch the fixed local header prefix and compute where the payload
    /// begins, relative to the entry's header offset.
    pub async fn find_body_offset(&self, entry: &ZipEntry) -> Result<u64> {
        let from = entry.header_offset;
        let buf = self
            .fetcher
            .fetch_range(from, from + LOCAL_HEADER_LEN as u64 - 1)
            .await?;

        let mut cursor = ByteCursor::new(&buf);
        let signature = cursor.u32()?;
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(Error::Format {
                offset: from,
                reason: "local file header signature mismatch",
            });
        }
        cursor.skip(22)?; // versions, flags, method, timestamps, crc, sizes
        let name_len = cursor.u16()? as u64;
        let extra_len = cursor.u16()? as u64;

        Ok(LOCAL_HEADER_LEN as u64 + name_len + extra_len)
    }

    /// Retrieve one file entry into `dest`.
    ///
    /// Returns the entry with `local_path` set. On failure the error
    /// carries the entry name and header offset, and no partial output is
    /// left behind; a payload that fetched completely but has no usable
    /// codec stays on disk in compressed form.
    pub async fn retrieve(&self, entry: &ZipEntry, dest: &Path) -> Result<ZipEntry> {
        self.retrieve_inner(entry, dest)
            .await
            .map_err(|e| e.for_entry(&entry.name, entry.header_offset))
    }

    async fn retrieve_inner(&self, entry: &ZipEntry, dest: &Path) -> Result<ZipEntry> {
        let relative = entry_destination(&entry.name, self.flatten).ok_or(Error::Format {
            offset: entry.header_offset,
            reason: "entry name escapes the destination directory",
        })?;
        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if let Err(e) = self.fetch_body(entry, &path).await {
            // Never leave a silently truncated file behind.
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }

        // Stored payloads are final as persisted; anything else expands in
        // place through the registry.
        if entry.method != CompressionMethod::Stored {
            expand_payload(&self.codecs, entry, &path).await?;
        }

        let mut done = entry.clone();
        done.local_path = Some(path);
        Ok(done)
    }

    /// Fetch the payload partitions concurrently and write them to `path`
    /// in strict partition order.
    async fn fetch_body(&self, entry: &ZipEntry, path: &Path) -> Result<()> {
        let body_offset = self.find_body_offset(entry).await?;
        let payload_start = entry.header_offset + body_offset;
        let spans = partition_spans(entry.compressed_size, self.partitions);

        // Each partition lands in its own buffer; completion order does
        // not matter because the flush below follows partition order.
        let mut handles = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            let fetcher = Arc::clone(&self.fetcher);
            let (from, to) = (payload_start + start, payload_start + end - 1);
            handles.push(tokio::spawn(
                async move { fetcher.fetch_range(from, to).await },
            ));
        }

        let mut file = fs::File::create(path).await?;
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let outcome: Result<Vec<u8>> = match handle.await {
                Ok(fetched) => fetched,
                Err(join_error) => Err(join_error.into()),
            };
            let part = match outcome {
                Ok(part) => part,
                Err(e) => {
                    for handle in pending {
                        handle.abort();
                    }
                    return Err(e);
                }
            };
            if let Err(e) = file.write_all(&part).await {
                for handle in pending {
                    handle.abort();
                }
                return Err(e.into());
            }
        }
        file.flush().await?;

        Ok(())
    }

    /// Retrieve a batch of entries under a bounded worker pool.
    ///
    /// Results come back in input order. One entry's failure never
    /// cancels another's retrieval. Directory entries create their
    /// directory (unless flattening) and fetch nothing.
    pub async fn retrieve_all(&self, entries: &[ZipEntry], dest: &Path) -> Vec<Result<ZipEntry>> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(entries.len());

        for entry in entries {
            let retriever = self.clone();
            let entry = entry.clone();
            let dest = dest.to_path_buf();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?;

                if entry.is_directory() {
                    if !retriever.flatten {
                        if let Some(relative) = entry_destination(&entry.name, false) {
                            fs::create_dir_all(dest.join(relative)).await.map_err(|e| {
                                Error::from(e).for_entry(&entry.name, entry.header_offset)
                            })?;
                        }
                    }
                    return Ok(entry);
                }

                retriever.retrieve(&entry, &dest).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(join_error.into()),
            });
        }
        results
    }
}

/// Map an entry name to its relative destination path.
///
/// Flattened mode keeps only the last path segment. Otherwise the
/// archive's directory structure is preserved; absolute names and upward
/// traversal are rejected since they cannot land inside the destination.
fn entry_destination(name: &str, flatten: bool) -> Option<PathBuf> {
    if flatten {
        let segment = name.rsplit('/').find(|s| !s.is_empty())?;
        if segment == "." || segment == ".." {
            return None;
        }
        return Some(PathBuf::from(segment));
    }

    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Split `[0, total)` into at most `parts` contiguous half-open spans.
///
/// The division remainder is absorbed by the last span; totals smaller
/// than `parts` degrade to one span per byte. Concatenating the spans in
/// order always reproduces `[0, total)` exactly.
pub(crate) fn partition_spans(total: u64, parts: usize) -> Vec<(u64, u64)> {
    if total == 0 {
        return Vec::new();
    }
    let parts = (parts as u64).clamp(1, total);
    let per = total / parts;
    (0..parts)
        .map(|i| {
            let start = i * per;
            let end = if i == parts - 1 { total } else { start + per };
            (start, end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MemoryFetcher;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn local_header(name: &str, extra: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        b.extend_from_slice(&20u16.to_le_bytes()); // version needed
        b.extend_from_slice(&0u16.to_le_bytes()); // flags
        b.extend_from_slice(&0u16.to_le_bytes()); // method
        b.extend_from_slice(&0u16.to_le_bytes()); // mod time
        b.extend_from_slice(&0u16.to_le_bytes()); // mod date
        b.extend_from_slice(&0u32.to_le_bytes()); // crc32
        b.extend_from_slice(&0u32.to_le_bytes()); // compressed size
        b.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size
        b.extend_from_slice(&(name.len() as u16).to_le_bytes());
        b.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        b.extend_from_slice(name.as_bytes());
        b.extend_from_slice(extra);
        b
    }

    fn entry_named(name: &str, method: u16, payload: &[u8], original: &[u8]) -> ZipEntry {
        ZipEntry {
            name: name.to_string(),
            comment: String::new(),
            non_utf8: false,
            flags: 0,
            method: CompressionMethod::from_u16(method),
            modified_time: 0,
            modified_date: 0,
            crc32: crc32fast::hash(original),
            compressed_size: payload.len() as u64,
            uncompressed_size: original.len() as u64,
            extra: Vec::new(),
            external_attrs: 0,
            header_offset: 0,
            local_path: None,
        }
    }

    fn retriever_over(resource: Vec<u8>) -> BodyRetriever<MemoryFetcher> {
        BodyRetriever::new(Arc::new(MemoryFetcher(resource)), CodecRegistry::new())
    }

    #[test]
    fn eleven_bytes_in_five_partitions() {
        let spans = partition_spans(11, 5);
        let lens: Vec<u64> = spans.iter().map(|(s, e)| e - s).collect();
        assert_eq!(lens, vec![2, 2, 2, 2, 3]);
        assert_eq!(spans.first().unwrap().0, 0);
        assert_eq!(spans.last().unwrap().1, 11);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn sizes_smaller_than_partition_count() {
        let spans = partition_spans(3, 5);
        assert_eq!(spans, vec![(0, 1), (1, 2), (2, 3)]);
        assert!(partition_spans(0, 5).is_empty());
        assert_eq!(partition_spans(1, 5), vec![(0, 1)]);
    }

    #[test]
    fn evenly_divisible_partitions() {
        let spans = partition_spans(10, 5);
        assert_eq!(spans.len(), 5);
        assert!(spans.iter().all(|(s, e)| e - s == 2));
    }

    #[tokio::test]
    async fn body_offset_counts_name_and_extra() {
        let resource = local_header("data.bin", &[1, 2, 3]);
        let entry = entry_named("data.bin", 0, b"", b"");

        let offset = retriever_over(resource)
            .find_body_offset(&entry)
            .await
            .unwrap();
        assert_eq!(offset, 30 + 8 + 3);
    }

    #[tokio::test]
    async fn wrong_local_signature_is_a_format_error() {
        let mut resource = local_header("data.bin", &[]);
        resource[0] = b'Q';
        let entry = entry_named("data.bin", 0, b"", b"");

        let err = retriever_over(resource)
            .find_body_offset(&entry)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Format { offset: 0, .. }));
    }

    #[tokio::test]
    async fn partitioned_retrieval_matches_contiguous_payload() {
        let payload: Vec<u8> = (0..11u8).collect();
        let mut resource = local_header("spanned.bin", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("spanned.bin", 0, &payload, &payload);

        let dir = tempfile::tempdir().unwrap();
        let done = retriever_over(resource)
            .partitions(5)
            .retrieve(&entry, dir.path())
            .await
            .unwrap();

        let written = std::fs::read(done.local_path.unwrap()).unwrap();
        assert_eq!(written, payload);
    }

    #[tokio::test]
    async fn stored_entry_bytes_are_persisted_unmodified() {
        let payload = b"already plain text".to_vec();
        let mut resource = local_header("plain.txt", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("plain.txt", 0, &payload, &payload);

        let dir = tempfile::tempdir().unwrap();
        retriever_over(resource)
            .retrieve(&entry, dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("plain.txt")).unwrap(), payload);
    }

    #[tokio::test]
    async fn deflated_entry_expands_to_declared_size_and_crc() {
        let original: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&original).unwrap();
        let payload = encoder.finish().unwrap();

        let mut resource = local_header("blob.bin", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("blob.bin", 8, &payload, &original);

        let dir = tempfile::tempdir().unwrap();
        retriever_over(resource)
            .partitions(5)
            .retrieve(&entry, dir.path())
            .await
            .unwrap();

        let expanded = std::fs::read(dir.path().join("blob.bin")).unwrap();
        assert_eq!(expanded.len() as u64, entry.uncompressed_size);
        assert_eq!(crc32fast::hash(&expanded), entry.crc32);
        assert_eq!(expanded, original);
    }

    #[tokio::test]
    async fn nested_entry_names_preserve_structure_by_default() {
        let payload = b"nested".to_vec();
        let mut resource = local_header("a/b/c.txt", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("a/b/c.txt", 0, &payload, &payload);

        let dir = tempfile::tempdir().unwrap();
        retriever_over(resource.clone())
            .retrieve(&entry, dir.path())
            .await
            .unwrap();
        assert!(dir.path().join("a/b/c.txt").is_file());

        let flat = tempfile::tempdir().unwrap();
        retriever_over(resource)
            .flatten(true)
            .retrieve(&entry, flat.path())
            .await
            .unwrap();
        assert!(flat.path().join("c.txt").is_file());
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let payload = b"evil".to_vec();
        let mut resource = local_header("../escape.txt", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("../escape.txt", 0, &payload, &payload);

        let dir = tempfile::tempdir().unwrap();
        let err = retriever_over(resource)
            .retrieve(&entry, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Entry { .. }));
        assert!(!dir.path().join("../escape.txt").exists());
    }

    #[tokio::test]
    async fn one_failed_entry_does_not_disturb_the_others() {
        let payload = b"good bytes".to_vec();
        let mut resource = local_header("good.txt", &[]);
        resource.extend_from_slice(&payload);
        let resource_len = resource.len() as u64;

        let good = entry_named("good.txt", 0, &payload, &payload);
        let mut bad = entry_named("bad.txt", 0, &payload, &payload);
        bad.header_offset = resource_len + 500; // points past the resource

        let dir = tempfile::tempdir().unwrap();
        let results = retriever_over(resource)
            .retrieve_all(&[bad.clone(), good.clone()], dir.path())
            .await;

        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        // The failed entry left nothing behind; the good one is intact.
        assert!(!dir.path().join("bad.txt").exists());
        assert_eq!(std::fs::read(dir.path().join("good.txt")).unwrap(), payload);
        // The failure names the entry for diagnosis.
        let message = results[0].as_ref().unwrap_err().to_string();
        assert!(message.contains("bad.txt"));
    }

    #[tokio::test]
    async fn unknown_method_reports_and_keeps_compressed_bytes() {
        let payload = b"mystery codec".to_vec();
        let mut resource = local_header("odd.bin", &[]);
        resource.extend_from_slice(&payload);
        let entry = entry_named("odd.bin", 14, &payload, &payload);

        let dir = tempfile::tempdir().unwrap();
        let err = retriever_over(resource)
            .retrieve(&entry, dir.path())
            .await
            .unwrap_err();

        match err {
            Error::Entry { source, .. } => {
                assert!(matches!(*source, Error::Algorithm { method: 14 }))
            }
            other => panic!("expected Entry wrapper, got {other}"),
        }
        // The fetched payload stays on disk, still compressed.
        assert_eq!(std::fs::read(dir.path().join("odd.bin")).unwrap(), payload);
    }
}
