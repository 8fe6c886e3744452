//! Ways of confirming a launch once the run control has been activated
//!
//! The console may show a confirmation dialog, render it in a way the
//! structured selectors miss, or swallow the first click entirely. Each case
//! is covered by one [`ConfirmStrategy`]; the launch loop tries them in order
//! and stops at the first that acts.

use crate::core::ConsoleProfile;
use crate::surface::{DomScan, Page, SurfaceError};
use async_trait::async_trait;

/// One way of pushing a pending launch through
#[async_trait]
pub trait ConfirmStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Try to act on the page; `Ok(true)` if something was clicked
    async fn attempt(&self, page: &dyn Page) -> Result<bool, SurfaceError>;
}

/// Click the first visible button among known dialog selectors
pub struct DialogSelectorStrategy {
    selectors: Vec<String>,
}

impl DialogSelectorStrategy {
    pub fn new(selectors: Vec<String>) -> Self {
        Self { selectors }
    }
}

#[async_trait]
impl ConfirmStrategy for DialogSelectorStrategy {
    fn name(&self) -> &str {
        "dialog selector"
    }

    async fn attempt(&self, page: &dyn Page) -> Result<bool, SurfaceError> {
        for selector in &self.selectors {
            if page.is_visible(selector).await? {
                page.click(selector, true).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Scan the DOM for a visible control whose text is exactly a confirm label
pub struct TextScanStrategy {
    scan: DomScan,
}

impl TextScanStrategy {
    pub fn new(selectors: Vec<String>, labels: Vec<String>) -> Self {
        Self {
            scan: DomScan::ClickByExactText { selectors, labels },
        }
    }
}

#[async_trait]
impl ConfirmStrategy for TextScanStrategy {
    fn name(&self) -> &str {
        "text scan"
    }

    async fn attempt(&self, page: &dyn Page) -> Result<bool, SurfaceError> {
        let clicked = page.evaluate(&self.scan).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }
}

/// Activate the primary run control again
pub struct ResubmitStrategy {
    run_button: String,
}

impl ResubmitStrategy {
    pub fn new(run_button: impl Into<String>) -> Self {
        Self {
            run_button: run_button.into(),
        }
    }
}

#[async_trait]
impl ConfirmStrategy for ResubmitStrategy {
    fn name(&self) -> &str {
        "resubmit"
    }

    async fn attempt(&self, page: &dyn Page) -> Result<bool, SurfaceError> {
        if !page.is_visible(&self.run_button).await? {
            return Ok(false);
        }
        page.click(&self.run_button, true).await?;
        Ok(true)
    }
}

/// Dialog selectors, then the text scan, then resubmitting
pub fn default_strategies(profile: &ConsoleProfile) -> Vec<Box<dyn ConfirmStrategy>> {
    vec![
        Box::new(DialogSelectorStrategy::new(
            profile.dialog_confirm_selectors.clone(),
        )),
        Box::new(TextScanStrategy::new(
            profile.scan_selectors.clone(),
            profile.confirm_labels.clone(),
        )),
        Box::new(ResubmitStrategy::new(profile.run_button_selector.clone())),
    ]
}
