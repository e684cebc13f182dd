//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automation::Locator;
use crate::retry::{BackoffPolicy, FixedRetryPolicy};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Options for the resumable-transport path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the upload API, without a trailing slash.
    pub base_url: String,

    /// Category identifier sent when a job does not set one; the metadata
    /// body always carries a category.
    pub default_category: String,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Per-request timeout covering one chunk or metadata call, not the
    /// whole upload.
    pub request_timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://upload.example.invalid".to_owned(),
            default_category: "22".to_owned(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl TransportConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }
}

/// Locators for the upload page, supplied by the embedding application.
///
/// The defaults are placeholders shaped like a typical studio upload page;
/// real deployments override them wholesale since page structure and
/// localization are not this crate's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSelectors {
    /// File input the media path is typed into.
    pub media_input: Locator,
    /// Title text field.
    pub title_field: Locator,
    /// Description text field.
    pub description_field: Locator,
    /// Privacy option; `{privacy}` is replaced with the job's privacy value.
    pub privacy_option_template: String,
    /// Thumbnail file input.
    pub thumbnail_input: Locator,
    /// Tags text field.
    pub tags_field: Locator,
    /// Final confirm/publish button.
    pub confirm_button: Locator,
    /// Element whose `href` carries the assigned media id once published.
    pub media_link: Locator,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            media_input: Locator::css("input[type='file'][name='media']"),
            title_field: Locator::css("#title-input"),
            description_field: Locator::css("#description-input"),
            privacy_option_template: "input[name='privacy'][value='{privacy}']".to_owned(),
            thumbnail_input: Locator::css("input[type='file'][name='thumbnail']"),
            tags_field: Locator::css("#tags-input"),
            confirm_button: Locator::css("#publish-button"),
            media_link: Locator::css("a.media-permalink"),
        }
    }
}

impl PageSelectors {
    /// Locator for one privacy option.
    pub fn privacy_option(&self, privacy: &str) -> Locator {
        Locator::css(self.privacy_option_template.replace("{privacy}", privacy))
    }
}

/// Options for the browser-automation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Upload page the session navigates to.
    pub upload_url: String,

    /// Persistent profile directory carrying prior authentication. Deleted
    /// between failed session attempts to clear corrupted lock state.
    pub profile_dir: PathBuf,

    /// Run the browser headless.
    pub headless: bool,

    /// Session start attempts before giving up.
    pub session_attempts: u32,

    /// Fixed delay between session attempts.
    pub session_retry_delay: Duration,

    /// Bounded wait for an element's presence.
    pub presence_timeout: Duration,

    /// Poll interval while waiting for presence.
    pub presence_poll_interval: Duration,

    /// Timeout on the native-click layer.
    pub native_click_timeout: Duration,

    /// Bounds of the randomized human-like pause after each action layer.
    pub human_delay_min: Duration,
    pub human_delay_max: Duration,

    /// How many times a stale element restarts the whole click primitive.
    pub stale_retries: u32,

    /// Bounded wait for the published-media link to appear after confirm.
    pub publish_timeout: Duration,

    /// Page locators.
    pub selectors: PageSelectors,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://studio.example.invalid/upload".to_owned(),
            profile_dir: PathBuf::from(".uplink-profile"),
            headless: true,
            session_attempts: 3,
            session_retry_delay: Duration::from_secs(5),
            presence_timeout: Duration::from_secs(15),
            presence_poll_interval: Duration::from_millis(250),
            native_click_timeout: Duration::from_secs(1),
            human_delay_min: Duration::from_millis(120),
            human_delay_max: Duration::from_millis(450),
            stale_retries: 2,
            publish_timeout: Duration::from_secs(60),
            selectors: PageSelectors::default(),
        }
    }
}

/// Retry profiles used across the engine. The two are intentionally
/// different shapes; see the retry module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Bounded exponential profile for request-level API calls.
    pub request_backoff: BackoffPolicy,
    /// Unbounded fixed-interval profile for the chunk-transfer loop.
    pub chunk_retry: FixedRetryPolicy,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    pub transport: TransportConfig,
    pub automation: AutomationConfig,
    pub retry: RetryConfig,

    /// End the batch when an automation session cannot be acquired. The
    /// profile is shared by every job in the batch, so retrying the next job
    /// against a broken resource rarely helps; opt out to fail jobs
    /// individually instead.
    #[serde(default = "default_halt_on_session_loss")]
    pub halt_on_session_loss: bool,
}

fn default_halt_on_session_loss() -> bool {
    true
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            automation: AutomationConfig::default(),
            retry: RetryConfig::default(),
            halt_on_session_loss: default_halt_on_session_loss(),
        }
    }
}

impl UplinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_automation(mut self, automation: AutomationConfig) -> Self {
        self.automation = automation;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_halt_on_session_loss(mut self, halt: bool) -> Self {
        self.halt_on_session_loss = halt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_option_template_substitutes_the_value() {
        let selectors = PageSelectors::default();
        let locator = selectors.privacy_option("unlisted");
        assert_eq!(
            locator,
            Locator::css("input[name='privacy'][value='unlisted']")
        );
    }

    #[test]
    fn defaults_keep_session_loss_fatal() {
        let config = UplinkConfig::new();
        assert!(config.halt_on_session_loss);
        assert_eq!(config.automation.session_attempts, 3);
        assert_eq!(config.automation.stale_retries, 2);
    }
}
