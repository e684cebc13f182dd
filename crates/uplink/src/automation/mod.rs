//! Browser-automation collaborator interface.
//!
//! The engine drives an external UI exclusively through these traits; which
//! WebDriver (or equivalent) sits behind them is the embedding application's
//! choice. Locators are opaque to the engine and come from configuration,
//! since the target page's structure and localization are not this crate's
//! business.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Element locator, interpreted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// CSS selector.
    Css(String),
    /// XPath expression.
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css:{s}"),
            Self::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Starts browser sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Start a session bound to a persistent profile directory.
    ///
    /// The profile is an OS-level exclusive resource: implementations must
    /// terminate any stale browser process still holding it before starting
    /// a new session.
    async fn start_session(
        &self,
        profile_dir: &Path,
        headless: bool,
    ) -> Result<Box<dyn AutomationSession>>;
}

/// One live browser session.
///
/// `find` is a single immediate lookup; waiting for presence is the
/// caller's polling loop, not the driver's.
#[async_trait]
pub trait AutomationSession: Send {
    /// Navigate to a URL.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Look the element up once. `ElementNotFound` when absent right now.
    async fn find(&mut self, locator: &Locator) -> Result<Box<dyn PageElement>>;

    /// Close the session. Idempotent, best effort.
    async fn close(&mut self) -> Result<()>;
}

/// A located element.
///
/// Any action may fail with `StaleElement` if the page re-rendered after
/// location; callers re-locate and retry.
#[async_trait]
pub trait PageElement: Send {
    /// Native click, as the driver defines it.
    async fn click(&mut self) -> Result<()>;

    /// Synthetic pointer move-and-click against the element's coordinates.
    async fn pointer_click(&mut self) -> Result<()>;

    /// Script-injected click dispatched in page context.
    async fn script_click(&mut self) -> Result<()>;

    async fn scroll_into_view(&mut self) -> Result<()>;

    /// Clear an input field.
    async fn clear(&mut self) -> Result<()>;

    /// Type text into the element.
    async fn send_keys(&mut self, text: &str) -> Result<()>;

    /// Visible text content.
    async fn text(&mut self) -> Result<String>;

    /// Attribute value, `None` when the attribute is absent.
    async fn attr(&mut self, name: &str) -> Result<Option<String>>;
}
