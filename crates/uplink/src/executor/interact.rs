//! Layered UI interaction primitives.
//!
//! Studio pages are hostile to plain clicks: consent overlays swallow them,
//! elements re-render mid-action, and native clicks sometimes hang without
//! erroring. The click primitive here walks a three-layer ladder (native,
//! pointer gesture, scripted dispatch) and restarts itself when the element
//! goes stale underneath it.

use std::time::Duration;

use rand::RngExt;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::automation::{AutomationSession, Locator, PageElement};
use crate::config::AutomationConfig;
use crate::error::{Result, UploadError};
use crate::events::EventSink;

/// Click an element, falling back through progressively blunter mechanisms.
///
/// 1. Wait for the element's presence (bounded poll), then scroll it into
///    view.
/// 2. Layer 1: native click under a short timeout.
/// 3. Layer 2: synthetic pointer move-and-click on the located element.
/// 4. Layer 3: script-injected click; its failure is the final answer.
///
/// A human-like pause follows every attempted layer. If the element goes
/// stale at any point the whole ladder restarts from the lookup, up to
/// `stale_retries` times.
pub async fn click_with_fallback(
    session: &mut dyn AutomationSession,
    locator: &Locator,
    config: &AutomationConfig,
    cancel: &CancellationToken,
    events: &EventSink,
) -> Result<()> {
    let mut restarts = 0u32;
    loop {
        match click_once(session, locator, config, cancel, events).await {
            Err(err) if err.is_stale_element() && restarts < config.stale_retries => {
                restarts += 1;
                warn!(%locator, restarts, "Element went stale mid-action; re-locating");
            }
            other => return other,
        }
    }
}

async fn click_once(
    session: &mut dyn AutomationSession,
    locator: &Locator,
    config: &AutomationConfig,
    cancel: &CancellationToken,
    events: &EventSink,
) -> Result<()> {
    let mut element = wait_for_presence(session, locator, config, cancel).await?;

    if let Err(err) = element.scroll_into_view().await {
        if err.is_stale_element() {
            return Err(err);
        }
        // Not every driver can scroll every element; the click layers decide
        // whether that actually matters.
        debug!(%locator, error = %err, "Scroll into view failed");
    }

    // Layer 1: a native click can hang on overlay-covered elements instead
    // of failing, so it gets a short leash.
    events.log(format!("Native click on {locator}"));
    let native = timeout(config.native_click_timeout, element.click()).await;
    human_delay(config).await;
    match native {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) if err.is_stale_element() => return Err(err),
        Ok(Err(err)) => debug!(%locator, error = %err, "Native click failed"),
        Err(_) => debug!(%locator, "Native click timed out"),
    }

    // Layer 2: drive the pointer to the coordinates we already located.
    events.log(format!("Pointer click on {locator}"));
    let pointer = element.pointer_click().await;
    human_delay(config).await;
    match pointer {
        Ok(()) => return Ok(()),
        Err(err) if err.is_stale_element() => return Err(err),
        Err(err) => debug!(%locator, error = %err, "Pointer click failed"),
    }

    // Layer 3: dispatch the click in page context. No further fallback.
    events.log(format!("Scripted click on {locator}"));
    let scripted = element.script_click().await;
    human_delay(config).await;
    match scripted {
        Ok(()) => Ok(()),
        Err(err) if err.is_stale_element() => Err(err),
        Err(err) => Err(UploadError::action_failed(
            "click",
            locator.to_string(),
            err.to_string(),
        )),
    }
}

/// Poll for an element until it exists or the presence timeout lapses.
///
/// Presence, not clickability: an element behind an overlay still counts,
/// and the click layers deal with the overlay.
pub(crate) async fn wait_for_presence(
    session: &mut dyn AutomationSession,
    locator: &Locator,
    config: &AutomationConfig,
    cancel: &CancellationToken,
) -> Result<Box<dyn PageElement>> {
    let deadline = Instant::now() + config.presence_timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        match session.find(locator).await {
            Ok(element) => return Ok(element),
            Err(err @ UploadError::ElementNotFound { .. }) => {
                if Instant::now() >= deadline {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            _ = sleep(config.presence_poll_interval) => {}
        }
    }
}

/// Pause for a randomized human-like interval between page actions.
pub(crate) async fn human_delay(config: &AutomationConfig) {
    let min = config.human_delay_min.as_millis() as u64;
    let max = config.human_delay_max.as_millis() as u64;
    let pause = if max > min {
        Duration::from_millis(rand::rng().random_range(min..=max))
    } else {
        config.human_delay_min
    };
    sleep(pause).await;
}
