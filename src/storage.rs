use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::debug;

/// Named file areas. Temporary areas hold uploads of unconfirmed
/// registrations, permanent areas hold files of promoted users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileArea {
    CvTemp,
    CvPermanent,
    PictureTemp,
    PicturePermanent,
}

impl FileArea {
    pub const TEMP: [FileArea; 2] = [FileArea::CvTemp, FileArea::PictureTemp];

    pub fn as_str(self) -> &'static str {
        match self {
            FileArea::CvTemp => "cv-temp",
            FileArea::CvPermanent => "cv-permanent",
            FileArea::PictureTemp => "picture-temp",
            FileArea::PicturePermanent => "picture-permanent",
        }
    }
}

/// A file listed from an area.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub name: String,
    pub modified_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put_object(
        &self,
        area: FileArea,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()>;
    /// Moves `name` from one area to another under `new_name`.
    async fn move_object(
        &self,
        from: FileArea,
        name: &str,
        to: FileArea,
        new_name: &str,
    ) -> anyhow::Result<()>;
    /// Returns whether anything was deleted.
    async fn delete_object(&self, area: FileArea, name: &str) -> anyhow::Result<bool>;
    async fn exists(&self, area: FileArea, name: &str) -> anyhow::Result<bool>;
    async fn list(&self, area: FileArea) -> anyhow::Result<Vec<StoredObject>>;
}

/// Rejects names that could escape their area.
fn check_name(name: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != "..",
        "invalid object name {:?}",
        name
    );
    Ok(())
}

// ---- local disk ----

#[derive(Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        for area in [
            FileArea::CvTemp,
            FileArea::CvPermanent,
            FileArea::PictureTemp,
            FileArea::PicturePermanent,
        ] {
            let dir = root.join(area.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create storage dir {}", dir.display()))?;
        }
        Ok(Self { root })
    }

    pub fn area_dir(&self, area: FileArea) -> PathBuf {
        self.root.join(area.as_str())
    }

    fn path(&self, area: FileArea, name: &str) -> anyhow::Result<PathBuf> {
        check_name(name)?;
        Ok(self.area_dir(area).join(name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put_object(
        &self,
        area: FileArea,
        name: &str,
        body: Bytes,
        _content_type: &str,
    ) -> anyhow::Result<()> {
        let path = self.path(area, name)?;
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(area = area.as_str(), name, bytes = body.len(), "file stored");
        Ok(())
    }

    async fn move_object(
        &self,
        from: FileArea,
        name: &str,
        to: FileArea,
        new_name: &str,
    ) -> anyhow::Result<()> {
        let src = self.path(from, name)?;
        let dst = self.path(to, new_name)?;
        tokio::fs::rename(&src, &dst)
            .await
            .with_context(|| format!("rename {} -> {}", src.display(), dst.display()))?;
        Ok(())
    }

    async fn delete_object(&self, area: FileArea, name: &str) -> anyhow::Result<bool> {
        let path = self.path(area, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn exists(&self, area: FileArea, name: &str) -> anyhow::Result<bool> {
        let path = self.path(area, name)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn list(&self, area: FileArea) -> anyhow::Result<Vec<StoredObject>> {
        list_dir(&self.area_dir(area)).await
    }
}

async fn list_dir(dir: &Path) -> anyhow::Result<Vec<StoredObject>> {
    let mut out = Vec::new();
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read dir {}", dir.display()))?;
    while let Some(entry) = rd.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        out.push(StoredObject {
            name,
            modified_at: meta.modified().ok().map(OffsetDateTime::from),
        });
    }
    Ok(out)
}

// ---- S3 / MinIO ----

#[derive(Clone)]
pub struct S3FileStore {
    client: Client,
    bucket: String,
}

impl S3FileStore {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }

    fn key(area: FileArea, name: &str) -> anyhow::Result<String> {
        check_name(name)?;
        Ok(format!("{}/{}", area.as_str(), name))
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn put_object(
        &self,
        area: FileArea,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()> {
        let key = Self::key(area, name)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn move_object(
        &self,
        from: FileArea,
        name: &str,
        to: FileArea,
        new_name: &str,
    ) -> anyhow::Result<()> {
        let src = Self::key(from, name)?;
        let dst = Self::key(to, new_name)?;
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src))
            .key(&dst)
            .send()
            .await
            .context("s3 copy_object")?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&src)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn delete_object(&self, area: FileArea, name: &str) -> anyhow::Result<bool> {
        if !self.exists(area, name).await? {
            return Ok(false);
        }
        let key = Self::key(area, name)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(true)
    }

    async fn exists(&self, area: FileArea, name: &str) -> anyhow::Result<bool> {
        let key = Self::key(area, name)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(e).context("s3 head_object"),
        }
    }

    async fn list(&self, area: FileArea) -> anyhow::Result<Vec<StoredObject>> {
        let prefix = format!("{}/", area.as_str());
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .context("s3 list_objects_v2")?;
            for obj in page.contents() {
                let Some(name) = obj.key().and_then(|k| k.strip_prefix(&prefix)) else {
                    continue;
                };
                let modified_at = obj
                    .last_modified()
                    .and_then(|t| OffsetDateTime::from_unix_timestamp(t.secs()).ok());
                out.push(StoredObject {
                    name: name.to_string(),
                    modified_at,
                });
            }
            match page.next_continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn local_store_put_move_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).await.unwrap();

        store
            .put_object(FileArea::CvTemp, "a.pdf", Bytes::from_static(b"%PDF-1.4"), "application/pdf")
            .await
            .unwrap();
        assert!(store.exists(FileArea::CvTemp, "a.pdf").await.unwrap());

        store
            .move_object(FileArea::CvTemp, "a.pdf", FileArea::CvPermanent, "b.pdf")
            .await
            .unwrap();
        assert!(!store.exists(FileArea::CvTemp, "a.pdf").await.unwrap());
        assert!(store.exists(FileArea::CvPermanent, "b.pdf").await.unwrap());

        assert!(store.delete_object(FileArea::CvPermanent, "b.pdf").await.unwrap());
        assert!(!store.delete_object(FileArea::CvPermanent, "b.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn local_store_lists_only_its_area() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).await.unwrap();
        store
            .put_object(FileArea::PictureTemp, "p.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        store
            .put_object(FileArea::CvTemp, "c.pdf", Bytes::from_static(b"x"), "application/pdf")
            .await
            .unwrap();

        let listed = store.list(FileArea::PictureTemp).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "p.png");
        assert!(listed[0].modified_at.is_some());
    }

    #[tokio::test]
    async fn rejects_path_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).await.unwrap();
        assert!(store
            .put_object(FileArea::CvTemp, "../escape.pdf", Bytes::new(), "application/pdf")
            .await
            .is_err());
        assert!(store.exists(FileArea::CvTemp, "..").await.is_err());
    }
}
