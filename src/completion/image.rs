// image.rs - Image Generation Client
// Scans an image+text fragment stream for the first inline image, uploads it to
// the file host and hands back the hosted link.
//
// Used by: commands/generate.rs

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};

use crate::error::BotResult;
use crate::hosting::ImageUploader;

/// Shown when the model answered without producing any image.
pub const NO_IMAGE_MESSAGE: &str = "No image was generated for that prompt.";

#[derive(Debug, Clone, PartialEq)]
pub enum ImageFragment {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

pub type ImageFragmentStream = BoxStream<'static, BotResult<ImageFragment>>;

/// Successful outcomes of an image request. `NoImage` is informational, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Hosted(String),
    NoImage(String),
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> BotResult<ImageOutcome>;
}

/// A model that answers an image prompt with mixed text and image fragments.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn image_fragments(&self, prompt: &str) -> BotResult<ImageFragmentStream>;
}

/// Read fragments until the first image and stop there; later images are never
/// read. Returns `None` if the whole stream carried no image.
pub async fn first_image<S>(mut fragments: S) -> BotResult<Option<(String, Vec<u8>)>>
where
    S: Stream<Item = BotResult<ImageFragment>> + Unpin,
{
    while let Some(fragment) = fragments.next().await {
        match fragment? {
            ImageFragment::Image { mime_type, bytes } => return Ok(Some((mime_type, bytes))),
            ImageFragment::Text(text) => {
                log::debug!("[IMAGE] Model text alongside image: {}", text);
            }
        }
    }
    Ok(None)
}

/// Generates with an `ImageSource` and posts the first image to an uploader.
pub struct HostedImageGenerator {
    source: Arc<dyn ImageSource>,
    host: Arc<dyn ImageUploader>,
}

impl HostedImageGenerator {
    pub fn new(source: Arc<dyn ImageSource>, host: Arc<dyn ImageUploader>) -> Self {
        Self { source, host }
    }
}

#[async_trait]
impl ImageBackend for HostedImageGenerator {
    async fn generate_image(&self, prompt: &str) -> BotResult<ImageOutcome> {
        let fragments = self.source.image_fragments(prompt).await?;
        match first_image(fragments).await? {
            Some((mime_type, bytes)) => {
                log::info!("[IMAGE] Got {} bytes of {}, uploading", bytes.len(), mime_type);
                let link = self.host.upload(bytes, &mime_type).await?;
                Ok(ImageOutcome::Hosted(link))
            }
            None => Ok(ImageOutcome::NoImage(NO_IMAGE_MESSAGE.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(tag: u8) -> BotResult<ImageFragment> {
        Ok(ImageFragment::Image {
            mime_type: "image/png".to_string(),
            bytes: vec![tag],
        })
    }

    #[tokio::test]
    async fn test_first_image_wins() {
        let fragments = stream::iter(vec![
            Ok(ImageFragment::Text("Sure!".to_string())),
            image(1),
            image(2),
        ]);
        let found = first_image(fragments).await.unwrap();
        assert_eq!(found, Some(("image/png".to_string(), vec![1])));
    }

    #[tokio::test]
    async fn test_stops_reading_after_first_image() {
        let pulled = AtomicUsize::new(0);
        let fragments = stream::iter(vec![image(1), image(2), image(3)]).inspect(|_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        });
        let found = first_image(fragments).await.unwrap();
        assert_eq!(found.map(|(_, bytes)| bytes), Some(vec![1]));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_text_only_stream_has_no_image() {
        let fragments = stream::iter(vec![
            Ok(ImageFragment::Text("I can't draw that.".to_string())),
        ]);
        assert_eq!(first_image(fragments).await.unwrap(), None);
    }

    struct CannedSource {
        fragments: fn() -> Vec<BotResult<ImageFragment>>,
    }

    #[async_trait]
    impl ImageSource for CannedSource {
        async fn image_fragments(&self, _prompt: &str) -> BotResult<ImageFragmentStream> {
            Ok(stream::iter((self.fragments)()).boxed())
        }
    }

    #[derive(Default)]
    struct FakeHost {
        reject: bool,
        uploads: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ImageUploader for FakeHost {
        async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> BotResult<String> {
            self.uploads.lock().unwrap().push((mime_type.to_string(), bytes));
            if self.reject {
                return Err(BotError::UploadFailed("file host did not return a link".to_string()));
            }
            Ok("https://host/img.png".to_string())
        }
    }

    fn generator(fragments: fn() -> Vec<BotResult<ImageFragment>>, host: Arc<FakeHost>) -> HostedImageGenerator {
        HostedImageGenerator::new(Arc::new(CannedSource { fragments }), host)
    }

    #[tokio::test]
    async fn test_generator_uploads_first_image() {
        let host = Arc::new(FakeHost::default());
        let images = generator(|| vec![image(7), image(8)], host.clone());

        let outcome = images.generate_image("a cat").await.unwrap();

        assert_eq!(outcome, ImageOutcome::Hosted("https://host/img.png".to_string()));
        assert_eq!(
            host.uploads.lock().unwrap().clone(),
            vec![("image/png".to_string(), vec![7])]
        );
    }

    #[tokio::test]
    async fn test_generator_surfaces_upload_failure() {
        let host = Arc::new(FakeHost {
            reject: true,
            ..Default::default()
        });
        let images = generator(|| vec![image(1)], host.clone());

        assert!(matches!(
            images.generate_image("a cat").await,
            Err(BotError::UploadFailed(_))
        ));
        assert_eq!(host.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generator_without_image_skips_upload() {
        let host = Arc::new(FakeHost::default());
        let images = generator(|| vec![Ok(ImageFragment::Text("no".to_string()))], host.clone());

        assert_eq!(
            images.generate_image("a cat").await.unwrap(),
            ImageOutcome::NoImage(NO_IMAGE_MESSAGE.to_string())
        );
        assert!(host.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_before_image_propagates() {
        let fragments = stream::iter(vec![
            Err(BotError::GenerationFailed("quota".to_string())),
            image(1),
        ]);
        assert!(first_image(fragments).await.is_err());
    }
}
