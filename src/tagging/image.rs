//! Reduced, metadata-stripped copies of media sent to the providers

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{TagError, TagResult};
use crate::config::TaggingConfig;

/// Produces the bytes uploaded to a provider for one media file
#[async_trait]
pub trait ImageReducer: Send + Sync {
    /// A JPEG no larger than the provider limit; a single frame for videos
    async fn reduce(&self, source: &Path, is_video: bool) -> TagResult<Vec<u8>>;
}

/// Reducer shelling out to `vipsthumbnail` and `ffmpeg`
#[derive(Debug, Clone)]
pub struct ExternalToolReducer {
    vips_path: String,
    ffmpeg_path: String,
    max_height: u32,
    height_step: u32,
    max_bytes: u64,
    tool_timeout: Duration,
    temp_dir: PathBuf,
}

impl ExternalToolReducer {
    pub fn from_config(config: &TaggingConfig) -> Self {
        Self {
            vips_path: config.vips_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            max_height: config.max_image_height,
            height_step: config.height_step,
            max_bytes: config.max_file_size_bytes,
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    fn temp_file(&self, prefix: &str) -> PathBuf {
        self.temp_dir.join(format!("{}-{}.jpg", prefix, Uuid::new_v4()))
    }

    async fn run_tool(&self, program: &str, args: &[String]) -> TagResult<()> {
        debug!(program = %program, args = ?args, "Running image tool");
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        let output = tokio::time::timeout(self.tool_timeout, command.output())
            .await
            .map_err(|_| {
                TagError::ImageReduction(format!(
                    "{} timed out after {}s",
                    program,
                    self.tool_timeout.as_secs()
                ))
            })?
            .map_err(|e| TagError::ImageReduction(format!("{} could not start: {}", program, e)))?;

        if !output.status.success() {
            return Err(TagError::ImageReduction(format!(
                "{} failed: {}; error: '{}'",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn resize(&self, source: &Path, output: &Path, height: u32) -> TagResult<()> {
        let args = vec![
            "-d".to_string(),
            format!("--size=x{}", height),
            "-o".to_string(),
            format!("{}[Q=98,optimize_coding,strip]", output.display()),
            source.display().to_string(),
        ];
        self.run_tool(&self.vips_path, &args).await
    }

    async fn extract_frame(&self, video: &Path, output: &Path) -> TagResult<()> {
        let args = vec![
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "fatal".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-ss".to_string(),
            "00:00:01.0".to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            output.display().to_string(),
        ];
        self.run_tool(&self.ffmpeg_path, &args).await
    }

    async fn reduce_into(&self, source: &Path, is_video: bool, output: &Path) -> TagResult<()> {
        if !is_video {
            return self.shrink(source, output).await;
        }

        let frame = self.temp_file("fp-tag-frame");
        let result = match self.extract_frame(source, &frame).await {
            Ok(()) => self.shrink(&frame, output).await,
            Err(e) => Err(e),
        };
        remove_quietly(&frame).await;
        result
    }

    /// Resize `source` into `output`, lowering the height until it fits `max_bytes`
    async fn shrink(&self, source: &Path, output: &Path) -> TagResult<()> {
        let mut height = self.max_height;
        loop {
            self.resize(source, output, height).await?;
            let size = tokio::fs::metadata(output).await?.len();
            if size <= self.max_bytes {
                return Ok(());
            }
            if height <= self.height_step {
                return Err(TagError::ImageReduction(format!(
                    "{} is still {} bytes at height {}",
                    source.display(),
                    size,
                    height
                )));
            }
            height -= self.height_step;
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed deleting temporary file");
        }
    }
}

#[async_trait]
impl ImageReducer for ExternalToolReducer {
    async fn reduce(&self, source: &Path, is_video: bool) -> TagResult<Vec<u8>> {
        let output = self.temp_file("fp-tag");
        let result = match self.reduce_into(source, is_video, &output).await {
            Ok(()) => tokio::fs::read(&output).await.map_err(TagError::from),
            Err(e) => Err(e),
        };
        remove_quietly(&output).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_tool_is_reduction_error() {
        let dir = tempdir().unwrap();
        let mut config = crate::config::Config::embedded().unwrap().tagging;
        config.vips_path = dir.path().join("no-such-vips").display().to_string();
        let reducer = ExternalToolReducer::from_config(&config).with_temp_dir(dir.path());

        let err = reducer.reduce(&dir.path().join("a.jpg"), false).await.unwrap_err();
        assert!(matches!(err, TagError::ImageReduction(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Fake tools: vipsthumbnail writes as many bytes as the requested height,
    /// ffmpeg writes a tiny frame
    #[cfg(unix)]
    fn fake_tools(dir: &Path) -> (String, String) {
        use std::os::unix::fs::PermissionsExt;

        let scripts = [
            (
                "vipsthumbnail",
                "#!/bin/sh\nheight=\"${2#--size=x}\"\nout=\"${4%%\\[*}\"\nhead -c \"$height\" /dev/zero > \"$out\"\n",
            ),
            ("ffmpeg", "#!/bin/sh\nfor last; do :; done\nprintf 'frame' > \"$last\"\n"),
        ];
        for (name, body) in scripts {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (
            dir.join("vipsthumbnail").display().to_string(),
            dir.join("ffmpeg").display().to_string(),
        )
    }

    #[cfg(unix)]
    fn fake_reducer(tools: &Path, scratch: &Path, max_bytes: u64) -> ExternalToolReducer {
        let (vips, ffmpeg) = fake_tools(tools);
        let mut config = crate::config::Config::embedded().unwrap().tagging;
        config.vips_path = vips;
        config.ffmpeg_path = ffmpeg;
        config.max_image_height = 1436;
        config.height_step = 512;
        config.max_file_size_bytes = max_bytes;
        ExternalToolReducer::from_config(&config).with_temp_dir(scratch)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_image_height_steps_down_until_it_fits() {
        let tools = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let reducer = fake_reducer(tools.path(), scratch.path(), 500);

        // 1436 -> 924 -> 412
        let bytes = reducer.reduce(&tools.path().join("a.jpg"), false).await.unwrap();
        assert_eq!(bytes.len(), 412);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_frame_is_bounded_by_size_cap() {
        let tools = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let reducer = fake_reducer(tools.path(), scratch.path(), 500);

        let bytes = reducer.reduce(&tools.path().join("clip.mp4"), true).await.unwrap();
        assert_eq!(bytes.len(), 412);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_too_large_at_smallest_height_is_reduction_error() {
        let tools = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let reducer = fake_reducer(tools.path(), scratch.path(), 100);

        let err = reducer.reduce(&tools.path().join("a.jpg"), false).await.unwrap_err();
        match err {
            TagError::ImageReduction(message) => assert!(message.contains("412 bytes at height 412"), "{}", message),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let tools = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let hung = tools.path().join("hung");
        std::fs::write(&hung, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&hung, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = crate::config::Config::embedded().unwrap().tagging;
        config.vips_path = hung.display().to_string();
        config.tool_timeout_secs = 1;
        let reducer = ExternalToolReducer::from_config(&config).with_temp_dir(scratch.path());

        let started = std::time::Instant::now();
        let err = reducer.reduce(&tools.path().join("a.jpg"), false).await.unwrap_err();
        assert!(matches!(err, TagError::ImageReduction(ref message) if message.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
