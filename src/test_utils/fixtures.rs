//! Test fixtures for release manifests and archives
//!
//! Archives are built with the same crates the extractor reads them with, so
//! fixtures stay byte-compatible with what a release pipeline would publish.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

use crate::upgrade::{ChecksumVerifier, DigestAlgorithm, DownloadEntry, VersionDescriptor};

/// Lowercase MD5 hex digest of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    let mut reader = data;
    ChecksumVerifier::compute(&mut reader, DigestAlgorithm::Md5)
        .expect("hashing an in-memory buffer cannot fail")
}

/// Builder for archive payloads.
pub struct ArchiveFixture;

impl ArchiveFixture {
    /// Zip archive with the given file entries. Names ending in `/` become directories.
    pub fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).expect("zip directory");
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).expect("zip entry");
                writer.write_all(data).expect("zip data");
            }
        }
        writer.finish().expect("finish zip").into_inner()
    }

    /// Gzipped tarball with the given regular-file entries.
    pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).expect("tar entry");
        }
        builder.into_inner().expect("finish tar").finish().expect("finish gzip")
    }

    /// Single gzip stream whose header records `name`.
    pub fn gzip(name: &str, data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::GzBuilder::new().filename(name).write(Vec::new(), Compression::default());
        encoder.write_all(data).expect("gzip data");
        encoder.finish().expect("finish gzip")
    }
}

/// Builder for [`VersionDescriptor`] values.
#[derive(Clone, Debug)]
pub struct ManifestFixture {
    descriptor: VersionDescriptor,
}

impl ManifestFixture {
    /// Manifest for `version` with no downloads.
    pub fn new(version: &str) -> Self {
        Self {
            descriptor: VersionDescriptor {
                version: version.to_string(),
                release_date: "2024-05-01".to_string(),
                description: format!("Release {version}"),
                ..VersionDescriptor::default()
            },
        }
    }

    /// Add a download for `platform_key` (`{os}-{arch}`).
    pub fn download(mut self, platform_key: &str, url: &str, md5: &str) -> Self {
        self.descriptor.downloads.insert(
            platform_key.to_string(),
            DownloadEntry {
                url: url.to_string(),
                md5: md5.to_string(),
            },
        );
        self
    }

    /// Set the changelog URL.
    pub fn changelog(mut self, url: &str) -> Self {
        self.descriptor.changelog_url = url.to_string();
        self
    }

    /// The finished descriptor.
    pub fn build(self) -> VersionDescriptor {
        self.descriptor
    }

    /// The descriptor serialized as `latest.json`.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.descriptor).expect("serialize manifest")
    }
}
