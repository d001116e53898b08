use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use image::ImageFormat;
use log::{debug, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::metrics;

/// 相机拍摄的图片统一使用的后缀名
const CAPTURE_EXTENSION: &str = "jpg";

/// 图片所在的存储池
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// 用户上传的原图，永久保留
    Original,
    /// 缩放后的临时副本
    Resized,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Resized => f.write_str("resized"),
        }
    }
}

/// 一个已经（或即将）写入磁盘的图片文件
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: Uuid,
    pub path: PathBuf,
    pub pool: Pool,
    pub format: Option<ImageFormat>,
}

impl StoredImage {
    /// 存储池内的文件名，形如 `<uuid>.<ext>`
    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
    }
}

/// 管理原图与缩放图两个目录
#[derive(Debug, Clone)]
pub struct ImageStore {
    originals: PathBuf,
    resized: PathBuf,
}

impl ImageStore {
    /// 打开存储目录，不存在时自动创建
    pub fn open(originals: impl Into<PathBuf>, resized: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { originals: originals.into(), resized: resized.into() };
        for dir in [&store.originals, &store.resized] {
            fs::create_dir_all(dir).map_err(|e| PipelineError::storage(dir, e))?;
        }
        Ok(store)
    }

    pub fn dir(&self, pool: Pool) -> &Path {
        match pool {
            Pool::Original => &self.originals,
            Pool::Resized => &self.resized,
        }
    }

    /// 保存相机拍摄的图片，后缀名固定为 jpg
    pub fn persist_original(&self, bytes: &[u8]) -> Result<StoredImage> {
        self.write(Pool::Original, CAPTURE_EXTENSION, bytes)
    }

    /// 保存上传的文件，保留原始后缀名
    pub fn persist_upload(&self, bytes: &[u8], original_filename: &str) -> Result<StoredImage> {
        let extension = Path::new(original_filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        self.write(Pool::Original, &extension, bytes)
    }

    /// 分配一个新的文件路径，但不写入任何内容
    pub fn reserve(&self, pool: Pool, extension: &str) -> StoredImage {
        let id = Uuid::new_v4();
        let file_name = match extension {
            "" => id.to_string(),
            ext => format!("{id}.{ext}"),
        };
        let path = self.dir(pool).join(file_name);
        let format = ImageFormat::from_extension(extension);
        StoredImage { id, path, pool, format }
    }

    fn write(&self, pool: Pool, extension: &str, bytes: &[u8]) -> Result<StoredImage> {
        let image = self.reserve(pool, extension);
        fs::write(&image.path, bytes).map_err(|e| PipelineError::storage(&image.path, e))?;
        debug!("写入 {} 图片: {}", pool, image.path.display());
        Ok(image)
    }

    /// 删除图片，返回文件在删除前是否存在
    ///
    /// 文件不存在不视为错误；其他文件系统错误只记录日志，不会向上传播。
    pub fn delete(&self, image: &StoredImage) -> bool {
        match fs::remove_file(&image.path) {
            Ok(()) => {
                debug!("删除 {} 图片: {}", image.pool, image.path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("删除文件 {} 失败: {}", image.path.display(), e);
                metrics::inc_cleanup_failure();
                true
            }
        }
    }

    /// 将客户端提供的文件名解析为存储池内的路径
    ///
    /// 文件名必须是单个普通路径分量，包含 `..`、路径分隔符或绝对路径标记时返回 `None`。
    pub fn resolve_path(&self, pool: Pool, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains(['/', '\\', ':', '\0'])
        {
            return None;
        }
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.dir(pool).join(name)),
            _ => None,
        }
    }
}
