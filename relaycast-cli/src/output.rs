use std::path::{Path, PathBuf};

use relaycast_engine::SegmentDescriptor;
use tokio::fs;
use tracing::debug;

use crate::config::OutputSection;
use crate::error::Result;

/// Writes closed segments and the rolling playlist into one directory.
#[derive(Debug, Clone)]
pub struct SegmentWriter {
    dir: PathBuf,
    prefix: String,
    playlist_name: String,
}

impl SegmentWriter {
    pub async fn create(dir: &Path, output: &OutputSection) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: output.prefix.clone(),
            playlist_name: output.playlist_name.clone(),
        })
    }

    /// Prefix the playlist URIs are built from. Matches the file names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn segment_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("{}_{sequence:05}.ts", self.prefix))
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(&self.playlist_name)
    }

    pub async fn write_segment(&self, segment: &SegmentDescriptor) -> Result<PathBuf> {
        let path = self.segment_path(segment.sequence);
        fs::write(&path, &segment.data).await?;
        debug!(path = %path.display(), len = segment.data.len(), "Wrote segment");
        Ok(path)
    }

    /// Replace the playlist through a temporary file so players never read
    /// a half-written one.
    pub async fn write_playlist(&self, playlist: &str) -> Result<()> {
        let path = self.playlist_path();
        let tmp = path.with_extension("m3u8.tmp");
        fs::write(&tmp, playlist).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_writes_segments_and_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hls");
        let writer = SegmentWriter::create(&out, &OutputSection::default()).await.unwrap();

        let segment = SegmentDescriptor {
            sequence: 42,
            duration_secs: 2,
            data: Bytes::from_static(&[0x47; 376]),
        };
        let path = writer.write_segment(&segment).await.unwrap();
        assert_eq!(path, out.join("segment_00042.ts"));
        assert_eq!(std::fs::read(&path).unwrap().len(), 376);

        writer.write_playlist("#EXTM3U\n").await.unwrap();
        writer.write_playlist("#EXTM3U\n#EXT-X-VERSION:3\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(out.join("playlist.m3u8")).unwrap(),
            "#EXTM3U\n#EXT-X-VERSION:3\n"
        );
        assert!(!out.join("playlist.m3u8.tmp").exists());
    }
}
