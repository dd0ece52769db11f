use anyhow::Result;
use tokio::time::sleep;

use super::{resolve, Intent, ResolveMode, ResolvedTarget};
use crate::browser::dom::{capture_snapshot, open_menus_script};
use crate::browser::{BrowserDriver, DomElement};
use crate::models::Locator;
use crate::timing::TimingScheduler;

/// Score reported for a locator resolved by its CSS selector
pub const SELECTOR_SCORE: i32 = i32::MAX;

/// Resolve a locator against the live page.
///
/// A selector is checked directly. Text goes through a general pass, then
/// (only when that finds nothing) collapsed menus whose content matches are
/// opened, then the page is polled for late-rendered content with
/// high-confidence passes, and finally one more general pass runs.
/// `Ok(None)` means every pass came up empty; `Err` is a driver failure.
pub async fn resolve_live(
    driver: &dyn BrowserDriver,
    timing: &TimingScheduler,
    locator: &Locator,
    intent: Intent,
) -> Result<Option<ResolvedTarget>> {
    if let Some(selector) = &locator.selector {
        match driver.bounding_box(selector).await? {
            Some(rect) if rect.is_visible() => {
                return Ok(Some(ResolvedTarget {
                    selector: selector.clone(),
                    element: DomElement {
                        selector: selector.clone(),
                        visible: true,
                        ..Default::default()
                    },
                    score: SELECTOR_SCORE,
                }));
            }
            Some(_) => tracing::debug!("Selector {} matched a hidden element", selector),
            None => tracing::debug!("Selector {} matched nothing", selector),
        }
    }

    let Some(query) = locator.text.as_deref() else {
        return Ok(None);
    };

    let snapshot = capture_snapshot(driver).await?;
    if let Some(target) = resolve(&snapshot, query, ResolveMode::General, intent) {
        return Ok(Some(target));
    }

    let opened = driver
        .evaluate(&open_menus_script(query))
        .await?
        .as_u64()
        .unwrap_or(0);
    if opened > 0 {
        tracing::debug!("Opened {} menu(s) looking for '{}'", opened, query);
        sleep(timing.menu_settle()).await;
        let snapshot = capture_snapshot(driver).await?;
        if let Some(target) = resolve(&snapshot, query, ResolveMode::General, intent) {
            return Ok(Some(target));
        }
    }

    for attempt in 1..=timing.resolver_attempts() {
        sleep(timing.resolver_backoff()).await;
        let snapshot = capture_snapshot(driver).await?;
        if let Some(target) = resolve(&snapshot, query, ResolveMode::HighConfidence, intent) {
            tracing::debug!("Resolved '{}' on poll {}", query, attempt);
            return Ok(Some(target));
        }
    }

    let snapshot = capture_snapshot(driver).await?;
    let target = resolve(&snapshot, query, ResolveMode::General, intent);
    if target.is_none() {
        tracing::warn!("No element matches '{}'", query);
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeDriver, FakePage};
    use tokio::time::{Duration, Instant};

    #[tokio::test]
    async fn test_selector_locator_is_checked_directly() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_id("save").with_text("Save")),
        );
        let timing = TimingScheduler::default();

        let target = resolve_live(&driver, &timing, &Locator::selector("#save"), Intent::Activate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.selector, "#save");
        assert_eq!(target.score, SELECTOR_SCORE);
    }

    #[tokio::test]
    async fn test_missing_selector_falls_back_to_text() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_text("Save")),
        );
        let timing = TimingScheduler::default();
        let locator = Locator::new(Some("Save".into()), Some("#gone".into()));

        let target = resolve_live(&driver, &timing, &locator, Intent::Activate).await.unwrap().unwrap();
        assert_eq!(target.element.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collapsed_menu_is_opened() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_text("Account"))
                .menu(
                    "account",
                    vec![DomElement::new(1, "a").with_role("menuitem").with_text("Sign out").in_overlay()],
                ),
        );
        let timing = TimingScheduler::default();

        let started = Instant::now();
        let target = resolve_live(&driver, &timing, &Locator::text("Sign out"), Intent::Activate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.element.index, 1);
        assert!(started.elapsed() < timing.resolver_backoff() + timing.menu_settle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_rendered_content_is_polled() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_text("Load")),
        );
        let late = driver.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            late.add_page(
                FakePage::new("https://app.test/", "Home")
                    .element(DomElement::new(0, "button").with_text("Load"))
                    .element(DomElement::new(1, "button").with_text("Results ready")),
            );
        });
        let timing = TimingScheduler::default();

        let target = resolve_live(&driver, &timing, &Locator::text("Results ready"), Intent::Activate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.element.index, 1);
    }

    #[tokio::test]
    async fn test_typing_skips_matching_labels() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/signup", "Sign up")
                .element(DomElement::new(0, "label").with_text("Company"))
                .element(DomElement::new(1, "input").with_type("text").with_label("Company")),
        );
        let timing = TimingScheduler::default();

        let target = resolve_live(&driver, &timing, &Locator::text("Company"), Intent::Fill)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.element.index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_passes_return_none_within_bound() {
        let driver = FakeDriver::with_page(
            FakePage::new("https://app.test/", "Home")
                .element(DomElement::new(0, "button").with_text("Save")),
        );
        let timing = TimingScheduler::default();

        let started = Instant::now();
        let target = resolve_live(&driver, &timing, &Locator::text("Publish"), Intent::Activate).await.unwrap();
        assert!(target.is_none());
        assert_eq!(
            started.elapsed(),
            timing.resolver_backoff() * timing.resolver_attempts()
        );
    }
}
