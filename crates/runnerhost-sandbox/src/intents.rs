//! Runner intents: the optional capabilities a runner implements.
//!
//! [`RunnerIntents`] is computed once right after bootstrap and never
//! changes for the lifetime of the loaded runner. Facades consult it before
//! calling any optional method.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One optional capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PreferenceMenuBuilder,
    Authenticatable,
    ChapterEventHandler,
    LibraryEventHandler,
    LibrarySyncHandler,
    ChapterSyncHandler,
    ImageRequestHandler,
    PageLinkResolver,
    LibraryPageLinkProvider,
    BrowsePageLinkProvider,
    HasTagsView,
    CanHandleUrl,
    ContextMenuProvider,
    TrackingLifecycle,
    DirectoryProvider,
    FullInformationProvider,
}

impl Capability {
    pub const ALL: [Capability; 16] = [
        Self::PreferenceMenuBuilder,
        Self::Authenticatable,
        Self::ChapterEventHandler,
        Self::LibraryEventHandler,
        Self::LibrarySyncHandler,
        Self::ChapterSyncHandler,
        Self::ImageRequestHandler,
        Self::PageLinkResolver,
        Self::LibraryPageLinkProvider,
        Self::BrowsePageLinkProvider,
        Self::HasTagsView,
        Self::CanHandleUrl,
        Self::ContextMenuProvider,
        Self::TrackingLifecycle,
        Self::DirectoryProvider,
        Self::FullInformationProvider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreferenceMenuBuilder => "preference_menu_builder",
            Self::Authenticatable => "authenticatable",
            Self::ChapterEventHandler => "chapter_event_handler",
            Self::LibraryEventHandler => "library_event_handler",
            Self::LibrarySyncHandler => "library_sync_handler",
            Self::ChapterSyncHandler => "chapter_sync_handler",
            Self::ImageRequestHandler => "image_request_handler",
            Self::PageLinkResolver => "page_link_resolver",
            Self::LibraryPageLinkProvider => "library_page_link_provider",
            Self::BrowsePageLinkProvider => "browse_page_link_provider",
            Self::HasTagsView => "has_tags_view",
            Self::CanHandleUrl => "can_handle_url",
            Self::ContextMenuProvider => "context_menu_provider",
            Self::TrackingLifecycle => "tracking_lifecycle",
            Self::DirectoryProvider => "directory_provider",
            Self::FullInformationProvider => "full_information_provider",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sign-in flow an authenticatable runner offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMethod {
    #[default]
    None,
    Basic,
    Webview,
}

impl AuthenticationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Webview => "webview",
        }
    }
}

const AUTH_FLAG_PREFIX: &str = "auth:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerIntents {
    pub preference_menu_builder: bool,
    pub authenticatable: bool,
    pub authentication_method: AuthenticationMethod,
    pub chapter_event_handler: bool,
    pub library_event_handler: bool,
    pub library_sync_handler: bool,
    pub chapter_sync_handler: bool,
    pub image_request_handler: bool,
    pub page_link_resolver: bool,
    pub library_page_link_provider: bool,
    pub browse_page_link_provider: bool,
    pub has_tags_view: bool,
    pub can_handle_url: bool,
    pub context_menu_provider: bool,
    pub tracking_lifecycle: bool,
    pub directory_provider: bool,
    pub full_information_provider: bool,
}

impl RunnerIntents {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::PreferenceMenuBuilder => self.preference_menu_builder,
            Capability::Authenticatable => self.authenticatable,
            Capability::ChapterEventHandler => self.chapter_event_handler,
            Capability::LibraryEventHandler => self.library_event_handler,
            Capability::LibrarySyncHandler => self.library_sync_handler,
            Capability::ChapterSyncHandler => self.chapter_sync_handler,
            Capability::ImageRequestHandler => self.image_request_handler,
            Capability::PageLinkResolver => self.page_link_resolver,
            Capability::LibraryPageLinkProvider => self.library_page_link_provider,
            Capability::BrowsePageLinkProvider => self.browse_page_link_provider,
            Capability::HasTagsView => self.has_tags_view,
            Capability::CanHandleUrl => self.can_handle_url,
            Capability::ContextMenuProvider => self.context_menu_provider,
            Capability::TrackingLifecycle => self.tracking_lifecycle,
            Capability::DirectoryProvider => self.directory_provider,
            Capability::FullInformationProvider => self.full_information_provider,
        }
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::PreferenceMenuBuilder => &mut self.preference_menu_builder,
            Capability::Authenticatable => &mut self.authenticatable,
            Capability::ChapterEventHandler => &mut self.chapter_event_handler,
            Capability::LibraryEventHandler => &mut self.library_event_handler,
            Capability::LibrarySyncHandler => &mut self.library_sync_handler,
            Capability::ChapterSyncHandler => &mut self.chapter_sync_handler,
            Capability::ImageRequestHandler => &mut self.image_request_handler,
            Capability::PageLinkResolver => &mut self.page_link_resolver,
            Capability::LibraryPageLinkProvider => &mut self.library_page_link_provider,
            Capability::BrowsePageLinkProvider => &mut self.browse_page_link_provider,
            Capability::HasTagsView => &mut self.has_tags_view,
            Capability::CanHandleUrl => &mut self.can_handle_url,
            Capability::ContextMenuProvider => &mut self.context_menu_provider,
            Capability::TrackingLifecycle => &mut self.tracking_lifecycle,
            Capability::DirectoryProvider => &mut self.directory_provider,
            Capability::FullInformationProvider => &mut self.full_information_provider,
        }
    }

    pub fn set(&mut self, capability: Capability, enabled: bool) {
        *self.flag_mut(capability) = enabled;
    }

    /// Capabilities whose flag is set, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }

    /// Flat form stored in runner records: capability names, plus
    /// `auth:<method>` for authenticatable runners.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self
            .capabilities()
            .into_iter()
            .map(|c| c.as_str().to_string())
            .collect();
        if self.authenticatable {
            flags.push(format!("{AUTH_FLAG_PREFIX}{}", self.authentication_method.as_str()));
        }
        flags
    }

    /// Inverse of [`to_flags`](Self::to_flags). Unknown names are ignored.
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> Self {
        let mut intents = Self::default();
        for flag in flags {
            let flag = flag.as_ref();
            if let Some(method) = flag.strip_prefix(AUTH_FLAG_PREFIX) {
                intents.authentication_method = match method {
                    "basic" => AuthenticationMethod::Basic,
                    "webview" => AuthenticationMethod::Webview,
                    _ => AuthenticationMethod::None,
                };
            } else if let Some(capability) = Capability::parse(flag) {
                intents.set(capability, true);
            }
        }
        intents
    }
}
