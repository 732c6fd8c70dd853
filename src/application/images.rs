//! Image candidate validation and media reuse

use std::collections::HashMap;

use tracing::{debug, warn};
use url::Url;

use crate::application::events::EventEmitter;
use crate::domain::{CatalogApi, ImageRef, MediaMode, ProductImage, SyncEvent};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "svg"];

/// Last path segment of an http(s) URL, if it names a file
pub fn image_basename(src: &str) -> Option<String> {
    let url = Url::parse(src.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let path = url.path();
    if path.is_empty() || path == "/" || path.ends_with('/') {
        return None;
    }
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

pub fn has_image_extension(basename: &str) -> bool {
    basename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Drops candidates that cannot be an image file URL
pub fn sanitize_images(images: &[ProductImage]) -> Vec<ProductImage> {
    images
        .iter()
        .filter(|image| {
            image_basename(&image.src).is_some_and(|base| {
                base.chars().count() > 1 && (has_image_extension(&base) || base.contains('.'))
            })
        })
        .cloned()
        .collect()
}

/// Per-run resolver with a basename -> media id cache
#[derive(Debug, Default)]
pub struct ImageResolver {
    by_basename: HashMap<String, u64>,
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, basename: &str) -> Option<u64> {
        self.by_basename.get(basename).copied()
    }

    /// Image references for a product write, or `None` to omit the field
    pub async fn resolve(
        &mut self,
        catalog: &dyn CatalogApi,
        events: &EventEmitter,
        images: &[ProductImage],
        mode: MediaMode,
    ) -> Option<Vec<ImageRef>> {
        if mode == MediaMode::None || images.is_empty() {
            return None;
        }
        let cleaned = sanitize_images(images);
        if cleaned.is_empty() {
            debug!("No usable image URLs among {} candidates", images.len());
            return None;
        }
        if mode == MediaMode::Upload {
            return Some(
                cleaned
                    .into_iter()
                    .map(|image| ImageRef::Source { src: image.src })
                    .collect(),
            );
        }

        let mut refs = Vec::with_capacity(cleaned.len());
        for image in cleaned {
            let Some(basename) = image_basename(&image.src) else {
                refs.push(ImageRef::Source { src: image.src });
                continue;
            };

            if let Some(id) = self.cached(&basename) {
                events.emit(SyncEvent::FoundExistingMediaCached { basename, id });
                refs.push(ImageRef::Existing { id });
                continue;
            }

            match catalog.find_media_by_filename(&basename).await {
                Ok(Some(media)) => {
                    self.by_basename.insert(basename.clone(), media.id);
                    events.emit(SyncEvent::FoundExistingMedia {
                        basename,
                        id: media.id,
                    });
                    refs.push(ImageRef::Existing { id: media.id });
                }
                Ok(None) => {
                    events.emit(SyncEvent::FallbackUploadMedia {
                        basename,
                        src: image.src.clone(),
                    });
                    refs.push(ImageRef::Source { src: image.src });
                }
                Err(e) => {
                    warn!("⚠️ Media lookup for '{}' failed, uploading instead: {}", basename, e);
                    refs.push(ImageRef::Source { src: image.src });
                }
            }
        }

        (!refs.is_empty()).then_some(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCatalog;

    fn images(sources: &[&str]) -> Vec<ProductImage> {
        sources.iter().map(|s| ProductImage::new(*s)).collect()
    }

    #[test]
    fn test_sanitize_rules() {
        let kept = sanitize_images(&images(&[
            "https://cdn.example.com/a/photo.JPG",
            "http://cdn.example.com/file.bin",
            "ftp://cdn.example.com/photo.jpg",
            "https://cdn.example.com/dir/",
            "https://cdn.example.com/",
            "https://cdn.example.com/noext",
            "https://cdn.example.com/x",
            "not a url",
        ]));
        let sources: Vec<&str> = kept.iter().map(|i| i.src.as_str()).collect();
        assert_eq!(
            sources,
            vec!["https://cdn.example.com/a/photo.JPG", "http://cdn.example.com/file.bin"]
        );
    }

    #[test]
    fn test_basename_extraction() {
        assert_eq!(
            image_basename("https://cdn.example.com/p/1/front.webp?v=2").as_deref(),
            Some("front.webp")
        );
        assert!(has_image_extension("front.JPEG"));
        assert!(!has_image_extension("archive.zip"));
    }

    #[tokio::test]
    async fn test_none_mode_sends_nothing() {
        let catalog = FakeCatalog::new();
        let mut resolver = ImageResolver::new();
        let out = resolver
            .resolve(
                &catalog,
                &EventEmitter::detached(),
                &images(&["https://cdn.example.com/a.jpg"]),
                MediaMode::None,
            )
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_all_invalid_becomes_none() {
        let catalog = FakeCatalog::new();
        let mut resolver = ImageResolver::new();
        let out = resolver
            .resolve(
                &catalog,
                &EventEmitter::detached(),
                &images(&["https://cdn.example.com/"]),
                MediaMode::Upload,
            )
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_prefer_existing_reuses_and_caches() {
        let catalog = FakeCatalog::new();
        catalog.add_media(77, "https://shop.example.com/uploads/front.jpg");
        let (events, mut stream) = EventEmitter::channel();
        let mut resolver = ImageResolver::new();
        let candidates = images(&[
            "https://cdn.example.com/front.jpg",
            "https://cdn.example.com/back.jpg",
        ]);

        let first = resolver
            .resolve(&catalog, &events, &candidates, MediaMode::PreferExistingByFilename)
            .await
            .unwrap();
        let second = resolver
            .resolve(&catalog, &events, &candidates[..1], MediaMode::PreferExistingByFilename)
            .await
            .unwrap();

        assert_eq!(first[0], ImageRef::Existing { id: 77 });
        assert_eq!(
            first[1],
            ImageRef::Source {
                src: "https://cdn.example.com/back.jpg".into()
            }
        );
        assert_eq!(second, vec![ImageRef::Existing { id: 77 }]);
        assert_eq!(catalog.media_lookup_calls(), 2);

        let kinds: Vec<&str> = stream.drain().iter().map(SyncEvent::kind).collect();
        assert_eq!(
            kinds,
            vec!["found_existing_media", "fallback_upload_media", "found_existing_media_cached"]
        );
    }
}
