use std::ops::Deref;

use serde_json::Value;

use super::RunnerHandle;
use crate::error::Result;
use crate::intents::Capability;
use crate::model::{
    Chapter, ChapterData, Content, DirectoryConfig, DirectoryRequest, Highlight, PageLink, PagedResult,
};

/// A runner that provides content.
#[derive(Clone)]
pub struct ContentSource {
    handle: RunnerHandle,
}

impl ContentSource {
    pub(crate) fn new(handle: RunnerHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &RunnerHandle {
        &self.handle
    }

    pub async fn get_content(&self, content_id: &str) -> Result<Content> {
        self.rpc().call_required("getContent", &(content_id,)).await
    }

    pub async fn get_chapters(&self, content_id: &str) -> Result<Vec<Chapter>> {
        Ok(self
            .rpc()
            .call("getChapters", &(content_id,))
            .await?
            .unwrap_or_default())
    }

    pub async fn get_chapter_data(&self, content_id: &str, chapter_id: &str) -> Result<Option<ChapterData>> {
        self.rpc()
            .call("getChapterData", &(content_id, chapter_id))
            .await
    }

    pub async fn get_directory(&self, request: &DirectoryRequest) -> Result<Option<PagedResult<Highlight>>> {
        self.rpc().call("getDirectory", &(request,)).await
    }

    pub async fn get_directory_config(&self, key: Option<&str>) -> Result<Option<DirectoryConfig>> {
        self.rpc().call("getDirectoryConfig", &(key,)).await
    }

    pub async fn on_chapter_read(&self, content_id: &str, chapter_id: &str) -> Result<()> {
        self.require(Capability::ChapterEventHandler, "onChapterRead")?;
        self.rpc()
            .call_void("onChapterRead", &(content_id, chapter_id))
            .await
    }

    pub async fn on_contents_added_to_library(&self, ids: &[String]) -> Result<()> {
        self.require(Capability::LibraryEventHandler, "onContentsAddedToLibrary")?;
        self.rpc()
            .call_void("onContentsAddedToLibrary", &(ids,))
            .await
    }

    pub async fn on_contents_removed_from_library(&self, ids: &[String]) -> Result<()> {
        self.require(Capability::LibraryEventHandler, "onContentsRemovedFromLibrary")?;
        self.rpc()
            .call_void("onContentsRemovedFromLibrary", &(ids,))
            .await
    }

    pub async fn sync_user_library(&self, library: &Value) -> Result<()> {
        self.require(Capability::LibrarySyncHandler, "syncUserLibrary")?;
        self.rpc().call_void("syncUserLibrary", &(library,)).await
    }

    pub async fn get_read_chapter_markers(&self, content_id: &str) -> Result<Vec<String>> {
        self.require(Capability::ChapterSyncHandler, "getReadChapterMarkers")?;
        Ok(self
            .rpc()
            .call("getReadChapterMarkers", &(content_id,))
            .await?
            .unwrap_or_default())
    }

    /// The guest may rewrite an image request (headers, URL).
    pub async fn will_request_image(&self, url: &str) -> Result<Option<Value>> {
        self.require(Capability::ImageRequestHandler, "willRequestImage")?;
        self.rpc().call("willRequestImage", &(url,)).await
    }

    pub async fn get_sections_for_page(&self, link: &Value) -> Result<Vec<Value>> {
        self.require(Capability::PageLinkResolver, "getSectionsForPage")?;
        Ok(self
            .rpc()
            .call("getSectionsForPage", &(link,))
            .await?
            .unwrap_or_default())
    }

    pub async fn resolve_page_section(&self, link: &Value, section_id: &str) -> Result<Option<Value>> {
        self.require(Capability::PageLinkResolver, "resolvePageSection")?;
        self.rpc()
            .call("resolvePageSection", &(link, section_id))
            .await
    }

    pub async fn get_library_page_links(&self) -> Result<Vec<PageLink>> {
        self.require(Capability::LibraryPageLinkProvider, "getLibraryPageLinks")?;
        Ok(self
            .rpc()
            .call("getLibraryPageLinks", &())
            .await?
            .unwrap_or_default())
    }

    pub async fn get_browse_page_links(&self) -> Result<Vec<PageLink>> {
        self.require(Capability::BrowsePageLinkProvider, "getBrowsePageLinks")?;
        Ok(self
            .rpc()
            .call("getBrowsePageLinks", &())
            .await?
            .unwrap_or_default())
    }

    pub async fn handle_url(&self, url: &str) -> Result<Option<Value>> {
        self.require(Capability::CanHandleUrl, "handleURL")?;
        self.rpc().call("handleURL", &(url,)).await
    }

    pub async fn get_context_actions(&self, highlight: &Highlight) -> Result<Vec<Value>> {
        self.require(Capability::ContextMenuProvider, "getContextActions")?;
        Ok(self
            .rpc()
            .call("getContextActions", &(highlight,))
            .await?
            .unwrap_or_default())
    }

    pub async fn did_trigger_context_action(&self, highlight: &Highlight, key: &str) -> Result<()> {
        self.require(Capability::ContextMenuProvider, "didTriggerContextAction")?;
        self.rpc()
            .call_void("didTriggerContextAction", &(highlight, key))
            .await
    }
}

impl Deref for ContentSource {
    type Target = RunnerHandle;

    fn deref(&self) -> &RunnerHandle {
        &self.handle
    }
}
