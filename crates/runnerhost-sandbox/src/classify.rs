//! Environment and intent detection by structural inspection.
//!
//! Runs once, right after bootstrap, against the runner's method names.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::SandboxBackend;
use crate::error::{Result, SandboxError};
use crate::intents::{AuthenticationMethod, Capability, RunnerIntents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerEnvironment {
    Source,
    Tracker,
    Plugin,
    Unknown,
}

impl RunnerEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Tracker => "tracker",
            Self::Plugin => "plugin",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(text: &str) -> Self {
        match text {
            "source" => Self::Source,
            "tracker" => Self::Tracker,
            "plugin" => Self::Plugin,
            _ => Self::Unknown,
        }
    }

    /// Methods a runner must expose to be classified as this environment.
    pub fn required_methods(self) -> &'static [&'static str] {
        match self {
            Self::Source => &["getContent"],
            Self::Tracker => &[
                "getTrackItem",
                "didUpdateLastReadChapter",
                "getResultsForTitles",
                "didSubmitEntryForm",
            ],
            Self::Plugin => &["getPluginActions", "runPluginAction"],
            Self::Unknown => &[],
        }
    }
}

impl fmt::Display for RunnerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in this order; the sets are disjoint.
const CANDIDATES: [RunnerEnvironment; 3] = [
    RunnerEnvironment::Source,
    RunnerEnvironment::Tracker,
    RunnerEnvironment::Plugin,
];

/// Intent detection rules: capability, environments it applies to, and
/// the methods that must all be present.
const INTENT_RULES: &[(Capability, &[RunnerEnvironment], &[&str])] = {
    use RunnerEnvironment::{Source, Tracker};
    &[
        (Capability::PreferenceMenuBuilder, &[Source, Tracker], &["getPreferenceMenu"]),
        (Capability::ChapterEventHandler, &[Source], &["onChapterRead"]),
        (
            Capability::LibraryEventHandler,
            &[Source],
            &["onContentsAddedToLibrary", "onContentsRemovedFromLibrary"],
        ),
        (Capability::LibrarySyncHandler, &[Source], &["syncUserLibrary"]),
        (Capability::ChapterSyncHandler, &[Source], &["getReadChapterMarkers"]),
        (Capability::ImageRequestHandler, &[Source], &["willRequestImage"]),
        (
            Capability::PageLinkResolver,
            &[Source],
            &["getSectionsForPage", "resolvePageSection"],
        ),
        (Capability::LibraryPageLinkProvider, &[Source], &["getLibraryPageLinks"]),
        (Capability::BrowsePageLinkProvider, &[Source], &["getBrowsePageLinks"]),
        (Capability::HasTagsView, &[Source, Tracker], &["getTags"]),
        (Capability::CanHandleUrl, &[Source], &["handleURL"]),
        (
            Capability::ContextMenuProvider,
            &[Source],
            &["getContextActions", "didTriggerContextAction"],
        ),
        (Capability::TrackingLifecycle, &[Tracker], &["beginTracking", "stopTracking"]),
        (
            Capability::DirectoryProvider,
            &[Tracker],
            &["getDirectory", "getDirectoryConfig"],
        ),
        (Capability::FullInformationProvider, &[Tracker], &["getFullInformation"]),
    ]
};

/// Result of classifying one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub environment: RunnerEnvironment,
    pub intents: RunnerIntents,
}

pub fn detect_environment(methods: &HashSet<String>) -> RunnerEnvironment {
    CANDIDATES
        .into_iter()
        .find(|env| env.required_methods().iter().all(|m| methods.contains(*m)))
        .unwrap_or(RunnerEnvironment::Unknown)
}

pub fn detect_intents(environment: RunnerEnvironment, methods: &HashSet<String>) -> RunnerIntents {
    let has = |name: &str| methods.contains(name);
    let mut intents = RunnerIntents::default();

    for (capability, environments, required) in INTENT_RULES {
        if environments.contains(&environment) {
            intents.set(*capability, required.iter().all(|m| has(m)));
        }
    }

    if matches!(environment, RunnerEnvironment::Source | RunnerEnvironment::Tracker) {
        let method = if has("handleBasicAuth") {
            AuthenticationMethod::Basic
        } else if has("getWebAuthRequestURL") {
            AuthenticationMethod::Webview
        } else {
            AuthenticationMethod::None
        };
        intents.authenticatable = has("getAuthenticatedUser") && method != AuthenticationMethod::None;
        if intents.authenticatable {
            intents.authentication_method = method;
        }
    }

    intents
}

/// Classify from a method set. An unknown environment is fatal.
pub fn classify(runner_id: &str, methods: &HashSet<String>) -> Result<Classification> {
    let environment = detect_environment(methods);
    if environment == RunnerEnvironment::Unknown {
        return Err(SandboxError::ClassificationFailed {
            runner_id: runner_id.to_string(),
        });
    }
    let intents = detect_intents(environment, methods);
    debug!(runner = runner_id, %environment, capabilities = ?intents.capabilities(), "runner classified");
    Ok(Classification { environment, intents })
}

/// Classify a booted sandbox by listing its methods.
pub async fn classify_backend(backend: &dyn SandboxBackend) -> Result<Classification> {
    let methods: HashSet<String> = backend.method_names().await?.into_iter().collect();
    classify(backend.runner_id(), &methods)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn get_content_alone_is_a_source() {
        let result = classify("r", &methods(&["getContent"])).unwrap();
        assert_eq!(result.environment, RunnerEnvironment::Source);
        assert_eq!(result.intents, RunnerIntents::default());
    }

    #[test]
    fn tracker_needs_the_full_set() {
        let full = methods(&[
            "getTrackItem",
            "didUpdateLastReadChapter",
            "getResultsForTitles",
            "didSubmitEntryForm",
        ]);
        assert_eq!(detect_environment(&full), RunnerEnvironment::Tracker);

        let partial = methods(&["getTrackItem", "getResultsForTitles"]);
        assert_eq!(detect_environment(&partial), RunnerEnvironment::Unknown);
    }

    #[test]
    fn plugin_signature() {
        let set = methods(&["getPluginActions", "runPluginAction"]);
        assert_eq!(detect_environment(&set), RunnerEnvironment::Plugin);
        assert_eq!(detect_intents(RunnerEnvironment::Plugin, &set), RunnerIntents::default());
    }

    #[test]
    fn unknown_is_classification_failure() {
        let err = classify("mystery", &methods(&["hello"])).unwrap_err();
        assert!(matches!(err, SandboxError::ClassificationFailed { runner_id } if runner_id == "mystery"));
    }

    #[test]
    fn missing_on_chapter_read_clears_flag() {
        let set = methods(&["getContent", "getTags"]);
        let intents = detect_intents(RunnerEnvironment::Source, &set);
        assert!(!intents.chapter_event_handler);
        assert!(intents.has_tags_view);
    }

    #[test]
    fn compound_intents_need_every_method() {
        let half = methods(&["getContent", "onContentsAddedToLibrary"]);
        assert!(!detect_intents(RunnerEnvironment::Source, &half).library_event_handler);

        let both = methods(&["getContent", "onContentsAddedToLibrary", "onContentsRemovedFromLibrary"]);
        assert!(detect_intents(RunnerEnvironment::Source, &both).library_event_handler);
    }

    #[test]
    fn authentication_prefers_basic() {
        let set = methods(&["getContent", "getAuthenticatedUser", "handleBasicAuth", "getWebAuthRequestURL"]);
        let intents = detect_intents(RunnerEnvironment::Source, &set);
        assert!(intents.authenticatable);
        assert_eq!(intents.authentication_method, AuthenticationMethod::Basic);

        let webview = methods(&["getContent", "getAuthenticatedUser", "getWebAuthRequestURL"]);
        let intents = detect_intents(RunnerEnvironment::Source, &webview);
        assert_eq!(intents.authentication_method, AuthenticationMethod::Webview);
    }

    #[test]
    fn sign_in_flow_without_status_query_is_not_authenticatable() {
        let set = methods(&["getContent", "handleBasicAuth"]);
        let intents = detect_intents(RunnerEnvironment::Source, &set);
        assert!(!intents.authenticatable);
        assert_eq!(intents.authentication_method, AuthenticationMethod::None);
    }

    #[test]
    fn flags_outside_the_environment_stay_false() {
        let set = methods(&[
            "getTrackItem",
            "didUpdateLastReadChapter",
            "getResultsForTitles",
            "didSubmitEntryForm",
            "onChapterRead",
            "beginTracking",
            "stopTracking",
        ]);
        let intents = detect_intents(RunnerEnvironment::Tracker, &set);
        assert!(!intents.chapter_event_handler);
        assert!(intents.tracking_lifecycle);
    }

    #[test]
    fn environment_names_round_trip() {
        for env in [RunnerEnvironment::Source, RunnerEnvironment::Tracker, RunnerEnvironment::Plugin] {
            assert_eq!(RunnerEnvironment::parse(env.as_str()), env);
        }
        assert_eq!(RunnerEnvironment::parse("other"), RunnerEnvironment::Unknown);
    }
}
