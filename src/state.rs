//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::hooks::HookBus;
use crate::media::MediaService;
use crate::upload::UploadService;
use crate::web::PageRenderer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    uploads: UploadService,
    pages: PageRenderer,
    media: MediaService,
    hooks: HookBus,
}

impl AppState {
    pub fn new(
        config: Config,
        uploads: UploadService,
        pages: PageRenderer,
        media: MediaService,
        hooks: HookBus,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                uploads,
                pages,
                media,
                hooks,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn uploads(&self) -> &UploadService {
        &self.inner.uploads
    }

    pub fn pages(&self) -> &PageRenderer {
        &self.inner.pages
    }

    pub fn media(&self) -> &MediaService {
        &self.inner.media
    }

    pub fn hooks(&self) -> &HookBus {
        &self.inner.hooks
    }
}
