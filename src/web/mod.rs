//! Page rendering for finalized items
//!
//! Pure string templating: the meta/embed page is built up inline, the
//! video player and legal pages come from HTML templates under the web
//! root with `%placeholder%` substitution. No state beyond config.

use std::path::{Path, PathBuf};

use crate::config::WebConfig;
use crate::mime;
use crate::upload::UploadedItem;

#[derive(Clone)]
pub struct PageRenderer {
    base_url: String,
    description: String,
    embed_color: String,
    contact_email: String,
    web_root: PathBuf,
}

impl PageRenderer {
    pub fn new(web: &WebConfig, web_root: impl Into<PathBuf>) -> Self {
        Self {
            base_url: web.base_url.clone(),
            description: web.description.clone(),
            embed_color: web.embed_color.clone(),
            contact_email: web.contact_email.clone(),
            web_root: web_root.into(),
        }
    }

    pub fn web_root(&self) -> &Path {
        &self.web_root
    }

    /// OpenGraph/Twitter embed page: instant redirect to the download URL
    /// plus whatever preview metadata the content type supports.
    pub fn meta_page(&self, item: &UploadedItem) -> String {
        let download_url = format!("{}/d/{}", self.base_url, item.id);
        let title = item.download_name();

        let mut content = String::new();
        content.push_str("<!DOCTYPE html>");
        content.push_str(&format!(
            "<meta http-equiv=\"refresh\" content=\"0; url='{}'\" />",
            download_url
        ));
        content.push_str("<meta name='robots' content='noindex'>");
        content.push_str("<meta charset='utf-8'>");
        content.push_str("<meta property='og:type' content='website'>");
        content.push_str("<meta property='twitter:card' content='summary_large_image'>");
        content.push_str(&format!("<meta name='title' content='{}'>", title));
        content.push_str(&format!("<meta property='og:title' content='{}'>", title));
        content.push_str(&format!(
            "<meta name='theme-color' content='{}'>",
            self.embed_color
        ));

        let content_type = mime::content_type_for(&item.extension);
        if content_type.starts_with("image/") {
            content.push_str(&format!(
                "<meta property='og:image' content='{}'>",
                download_url
            ));
            content.push_str(&format!(
                "<meta property='twitter:image' content='{}'>",
                download_url
            ));
            self.push_descriptions(&mut content, &self.description);
        } else if content_type.starts_with("video/") {
            let thumbnail_url = format!("{}/t/{}", self.base_url, item.id);
            let watch_url = format!("{}/v/{}", self.base_url, item.id);
            content.push_str(&format!(
                "<meta property='og:image' content='{}'>",
                thumbnail_url
            ));
            content.push_str(&format!(
                "<meta property='twitter:image' content='{}'>",
                thumbnail_url
            ));
            let description = format!("{}\nWatch video at: {}", self.description, watch_url);
            content.push_str(&format!(
                "<meta property='og:description' content='{}'>",
                description
            ));
            content.push_str(&format!(
                "<meta property='twitter:description' content='{}'>",
                description
            ));
        } else {
            self.push_descriptions(&mut content, &self.description);
        }

        content
    }

    fn push_descriptions(&self, content: &mut String, description: &str) {
        content.push_str(&format!(
            "<meta name='description' content='{}'>",
            description
        ));
        content.push_str(&format!(
            "<meta property='og:description' content='{}'>",
            description
        ));
        content.push_str(&format!(
            "<meta property='twitter:description' content='{}'>",
            description
        ));
    }

    /// Player page for video items. `None` for non-video content or when
    /// the template is absent from the web root.
    pub async fn video_page(&self, item: &UploadedItem) -> Option<String> {
        if !mime::is_video(&item.extension) {
            return None;
        }

        let template = tokio::fs::read_to_string(self.web_root.join("VideoPlayer.html"))
            .await
            .ok()?;

        let html = template
            .replace("%id%", &item.id)
            .replace("%name%", item.name.as_deref().unwrap_or(&item.hash))
            .replace("%description%", &self.description)
            .replace("%extension%", &item.extension)
            .replace(
                "%downloadUrl%",
                &format!("{}/d/{}", self.base_url, item.id),
            )
            .replace("%rootUrl%", &format!("{}/", self.base_url))
            .replace("%thumbnail%", &format!("{}/t/{}", self.base_url, item.id))
            .replace("%videoEmbedColor%", &self.embed_color);

        Some(html)
    }

    /// Legal page, if a template exists.
    pub async fn legal_page(&self) -> Option<String> {
        let template = tokio::fs::read_to_string(self.web_root.join("Legal.html"))
            .await
            .ok()?;
        Some(template.replace("%email%", &self.contact_email))
    }
}
